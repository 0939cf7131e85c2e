use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = portcullis::cli::PortcullisArgs::parse();

    portcullis::start_listening(args).await?.await
}
