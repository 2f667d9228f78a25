use std::sync::Arc;

use qkdlab_core::NotificationBoard;

pub fn run(engine: Option<&str>, channel: &super::ChannelArgs, poll_ms: Option<u64>) {
    let client = super::client_config(engine, poll_ms);
    let board = Arc::new(NotificationBoard::new(
        client.notification_ttl,
        qkdlab_core::notify::DEFAULT_CAPACITY,
    ));
    let controller = super::make_controller(client, board.clone());
    let rt = super::runtime();

    let mut app = crate::tui::app::App::new(controller, board, rt, channel.run_config());
    if let Err(e) = app.run() {
        eprintln!("TUI error: {e}");
        std::process::exit(1);
    }
}
