fn main() {
    if let Err(err) = forward_renderer::run() {
        eprintln!("Application error: {err}");
        std::process::exit(1);
    }
}
