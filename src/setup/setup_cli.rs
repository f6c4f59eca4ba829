use clap::{Parser, Subcommand};
use inkbase_backend::config::Config;
use inkbase_backend::models::db_operations::labels_db_operations;
use inkbase_backend::models::LabelKind;
use inkbase_backend::setup::db_setup;
use rusqlite::Connection;
use redb::Database;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Label {
        #[command(subcommand)]
        action: LabelAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    Setup {
        db_type: Option<String>,
    }
}

#[derive(Subcommand, Debug)]
enum LabelAction {
    Add {
        #[arg(long)]
        name: String,
        /// Either 'category' or 'tag'.
        #[arg(long)]
        kind: String,
    },
    List,
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => {
                match db_type.as_deref() {
                    Some("labels") => setup_labels_database(&config),
                    Some("posts") => setup_posts_database(&config),
                    Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'labels' or 'posts'.", other),
                    None => {
                        setup_labels_database(&config);
                        setup_posts_database(&config);
                    }
                }
            }
        },
        Commands::Label { action } => match action {
            LabelAction::Add { name, kind } => {
                add_label(&config, name, kind);
            }
            LabelAction::List => {
                list_labels(&config);
            }
        },
    }
}

fn setup_labels_database(config: &Config) {
    let db_path = config.labels_db_path();
    if db_path.exists() {
        println!("ℹ️ Labels database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up labels database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let mut conn = Connection::open(&db_path).expect("Could not create labels database file.");
    match db_setup::setup_labels_db(&mut conn) {
        Ok(_) => println!("✅ Labels database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up labels database: {}", e),
    }
}

fn setup_posts_database(config: &Config) {
    let db_path = config.posts_db_path();
    if db_path.exists() {
        println!("ℹ️ Posts database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up posts database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let db = Database::create(&db_path).expect("Failed to create posts database file.");
    match db_setup::setup_posts_db(&db) {
        Ok(_) => println!("✅ Posts database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up posts database: {}", e),
    }
}

fn add_label(config: &Config, name: &str, kind: &str) {
    let kind = match LabelKind::parse(kind) {
        Some(kind) => kind,
        None => {
            eprintln!("❌ Error: Unknown label kind '{}'. Use 'category' or 'tag'.", kind);
            return;
        }
    };

    let db_path = config.labels_db_path();
    if !db_path.exists() {
        eprintln!("❌ Error: Labels database not found at '{}'. Please run `setup_cli db setup` first.", db_path.display());
        return;
    }
    let conn = Connection::open(&db_path).expect("Could not open labels database.");

    match labels_db_operations::create_label(&conn, name, kind) {
        Ok(id) => println!("✅ Label '{}' ({}) created with id {}.", name, kind.as_str(), id),
        Err(e) => eprintln!("❌ Error creating label: {}", e),
    }
}

fn list_labels(config: &Config) {
    let conn = match Connection::open(&config.labels_db_path()) {
        Ok(c) => c,
        Err(_) => {
            eprintln!("❌ Error: Labels database not found. Please run `setup_cli db setup` first.");
            return;
        }
    };

    match labels_db_operations::read_all_labels(&conn, None) {
        Ok(labels) => {
            println!("Listing labels:");
            for label in labels {
                println!("- [{}] {} ({})", label.id, label.name, label.kind.as_str());
            }
        }
        Err(e) => eprintln!("❌ Error fetching labels: {}", e),
    }
}
