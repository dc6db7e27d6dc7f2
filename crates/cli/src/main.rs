use std::process::ExitCode;

fn main() -> ExitCode {
    finagent_cli::run()
}
