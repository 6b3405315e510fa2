mod cli;
mod infra;
mod routes;
mod server;

use iav_registry::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
