use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = vox_worker::Args::parse();

	vox_worker::run(args).await
}
