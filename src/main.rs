use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    arcend_lib::run().await
}
