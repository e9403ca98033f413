use std::process::exit;

fn main() {
    if let Err(e) = reflectprobe::app::run_cli() {
        eprintln!("{}", reflectprobe::output::error_line(&e));
        exit(1);
    }
}
