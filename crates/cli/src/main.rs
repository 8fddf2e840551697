use std::process::ExitCode;

fn main() -> ExitCode {
    crewflow_cli::run()
}
