fn main() {
    if let Err(err) = crmviz::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
