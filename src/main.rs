fn main() {
    if let Err(e) = tabchat::cli::main() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
