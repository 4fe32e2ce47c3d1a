use anyhow::Result;
use clap::Parser;
use tagspread::config::Config;
use tagspread::db::{self, Db};

#[derive(Parser, Debug)]
#[command(name = "export")]
#[command(about = "Print stored account records, with their tags, as JSON")]
struct Args {
    /// Indent the output
    #[arg(long)]
    pretty: bool,

    /// Only export accounts carrying at least one tag
    #[arg(long)]
    tagged_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load_offline()?;

    let db = Db::new(config.db_path());
    db.migrate().await?;

    let mut records = db::load_records(&db).await?;
    if args.tagged_only {
        records.retain(|record| !record.tags.is_empty());
    }
    log::info!("Exporting {} account record(s)", records.len());

    let json = if args.pretty {
        serde_json::to_string_pretty(&records)?
    } else {
        serde_json::to_string(&records)?
    };
    println!("{}", json);

    Ok(())
}
