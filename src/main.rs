fn main() {
    if let Err(e) = murmur_lib::run() {
        eprintln!("murmur: {e}");
        std::process::exit(1);
    }
}
