fn main() {
    if let Err(err) = gymproof_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
