fn main() {
    if let Err(err) = ollamarama::cli::main() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
