use mosaic_pipeline::cli::{exit_code, format_error, run};

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", format_error(&e));
        std::process::exit(exit_code(&e));
    }
}
