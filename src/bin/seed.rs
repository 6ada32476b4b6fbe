use chrono::Duration;
use clap::Parser;
use clubhouse::{
    auth::TokenService,
    config::Settings,
    domain::Club,
    repository::{self, SqliteClubDirectory},
};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "seed")]
#[command(about = "Create demo clubs and leaders for local testing")]
struct Cli {
    /// Database to seed (defaults to the configured database)
    #[arg(long)]
    database_url: Option<String>,

    /// Membership fee for the demo clubs, in VND
    #[arg(long, default_value_t = 100_000)]
    fee: i64,

    /// Lifetime of the printed tokens, in hours
    #[arg(long, default_value_t = 24)]
    token_hours: i64,
}

const DEMO_CLUBS: [&str; 3] = ["Guitar Club", "Chess Club", "Robotics Club"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::new().unwrap_or_default();

    println!("🌱 Starting database seeding...");

    let database_url = cli
        .database_url
        .unwrap_or_else(|| settings.database.url.clone());

    let db_pool = repository::connect_pool(&database_url, 5).await?;

    // Run migrations first
    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let clubs = SqliteClubDirectory::new(db_pool.clone());
    let tokens = TokenService::new(&settings.auth.jwt_secret);
    let ttl = Duration::hours(cli.token_hours);

    let leader_id = Uuid::new_v4();
    println!("🏛️  Creating clubs...");

    for name in DEMO_CLUBS {
        let club = Club {
            id: Uuid::new_v4(),
            name: name.to_string(),
            membership_fee: cli.fee,
        };
        clubs.upsert(&club).await?;
        clubs.add_leader(club.id, leader_id).await?;
        println!("  ✅ {} ({}), fee {}", club.name, club.id, club.membership_fee);
    }

    let student_id = Uuid::new_v4();

    println!("\n🔑 Tokens (valid {}h):", cli.token_hours);
    println!("  Leader  {}\n    {}", leader_id, tokens.issue(leader_id, ttl)?);
    println!("  Student {}\n    {}", student_id, tokens.issue(student_id, ttl)?);

    println!("\n✨ Seeding complete!");

    Ok(())
}
