use std::process::ExitCode;

fn main() -> ExitCode {
    assistant_cli::run()
}
