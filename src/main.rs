use std::process::ExitCode;

fn main() -> ExitCode {
    circuits_lib::run()
}
