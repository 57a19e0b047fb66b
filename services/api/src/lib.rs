mod cli;
mod export;
mod infra;
mod routes;
mod server;

use placement_ready::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
