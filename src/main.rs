fn main() {
    if let Err(err) = focusflow_lib::run() {
        log::error!("focusflow failed: {err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
