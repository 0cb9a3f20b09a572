mod cli;
mod commands;
mod infra;
mod routes;
mod server;

use tvde_fleet::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
