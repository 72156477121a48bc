use std::process::ExitCode;

fn main() -> ExitCode {
    dingbridge_cli::run()
}
