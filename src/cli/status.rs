use crate::app::AppContext;
use crate::cli::StatusArgs;
use crate::coordinator::HealthReport;
use anyhow::Result;

pub async fn execute(ctx: &AppContext, args: &StatusArgs) -> Result<()> {
    let report = ctx.coordinator().health().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);

    if args.verbose {
        match ctx.coordinator().list_all().await {
            Ok(users) => println!("Users:   {}", users.len()),
            Err(e) => println!("Users:   unavailable ({})", e),
        }
        println!();
        print!("{}", ctx.coordinator().metrics().render());
    }

    Ok(())
}

fn print_report(report: &HealthReport) {
    let store = if report.store {
        "✅ HEALTHY"
    } else {
        "❌ UNAVAILABLE"
    };
    println!("=== usercache {} status ===\n", report.version);
    println!("Store:   {}", store);
    println!("Cache:   {} ({})", report.cache, report.cache_backend);
}
