//! Router console entry point.

fn main() {
    if let Err(e) = lib_router_console::init() {
        eprintln!("❌ router_console: {e:#}");
        std::process::exit(1);
    }
}
