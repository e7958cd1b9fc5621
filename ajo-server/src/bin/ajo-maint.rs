//! ajo-maint: one-shot payout-date repair against the production database
//!
//! ```text
//! ajo-maint update-pool-dates
//! ajo-maint fix-member-payout-dates [POOL_ID]
//! ```
//!
//! Exits non-zero when the command fails or any pool could not be repaired.

use ajo_server::maintenance::{self, DateRepair};
use ajo_server::store::{PgStore, Store};
use anyhow::{Context, bail};

const USAGE: &str = "usage: ajo-maint <update-pool-dates | fix-member-payout-dates [POOL_ID]>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ajo_server=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let store = Store::Postgres(
        PgStore::connect(&database_url)
            .await
            .context("failed to connect to database")?,
    );
    let now = chrono::Utc::now();

    let results = match command.as_str() {
        "update-pool-dates" => maintenance::update_pool_dates(&store, now).await,
        "fix-member-payout-dates" => {
            let pool_id = args
                .get(1)
                .map(|raw| raw.parse::<i64>().with_context(|| format!("invalid pool id: {raw}")))
                .transpose()?;
            maintenance::fix_member_payout_dates(&store, pool_id, now).await
        }
        other => bail!("unknown command {other:?}\n{USAGE}"),
    }
    .context("maintenance run failed")?;

    summarize(&results)
}

fn summarize(results: &[DateRepair]) -> anyhow::Result<()> {
    for r in results {
        match (&r.error, r.updated) {
            (Some(err), _) => println!("{} ({}): FAILED {err}", r.pool_id, r.name),
            (None, true) => println!(
                "{} ({}): {} -> {}",
                r.pool_id,
                r.name,
                fmt_date(r.old_date),
                fmt_date(r.new_date)
            ),
            (None, false) => println!("{} ({}): unchanged", r.pool_id, r.name),
        }
    }

    let failed = results.iter().filter(|r| !r.success).count();
    let updated = results.iter().filter(|r| r.updated).count();
    println!("{} pools checked, {updated} updated, {failed} failed", results.len());
    if failed > 0 {
        bail!("{failed} pools could not be repaired");
    }
    Ok(())
}

fn fmt_date(date: Option<chrono::DateTime<chrono::Utc>>) -> String {
    date.map(|d| d.to_rfc3339()).unwrap_or_else(|| "-".into())
}
