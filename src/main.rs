mod actions;
mod bindings;
mod cli;
mod config;
mod debounce;
mod geometry;
mod gestures;
mod input;
mod ipc;
mod landmarks;
mod logging;
mod motion;
mod session;
mod toggle;
mod tracker;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
