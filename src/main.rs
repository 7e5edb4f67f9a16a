fn main() {
    if let Err(err) = subconscious::cli::main() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
