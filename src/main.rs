use std::process::ExitCode;
use sub_test::{cli, core::config::ConfigError};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            // Every error that escapes the driver is fatal for the directory run.
            match e.downcast_ref::<ConfigError>() {
                Some(config_error) => println!("[Error (sub_test): {}]", config_error),
                None => println!("[Error (sub_test): {:#}]", e),
            }
            ExitCode::from(ConfigError::EXIT_CODE)
        }
    }
}
