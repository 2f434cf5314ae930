//! Binary entrypoint for fontflow

fn main() {
    if let Err(err) = fontflow_cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
