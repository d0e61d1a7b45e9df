use std::process::ExitCode;

fn main() -> ExitCode {
    carelane_cli::run()
}
