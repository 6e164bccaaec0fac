use relbind::config::{self, Config};
use relbind::core::db::{self, QueryExecutor, Queryer};
use relbind::{record, Loader, Model, Result};
use tracing::info;

#[derive(Debug, Clone, Default)]
struct Role {
    id: i64,
    name: String,
}

record! {
    Role in "role" {
        columns: [id, name],
    }
}

#[derive(Debug, Clone, Default)]
struct Author {
    id: i64,
    name: String,
    role_id: i64,
    role: Option<Box<Role>>,
    entries: Vec<Entry>,
}

record! {
    Author in "author" {
        columns: [id, name, role_id],
        has_one: [role: Role => role_id = id],
        has_many: [entries: Entry => id = author_id],
    }
}

#[derive(Debug, Clone, Default)]
struct Entry {
    id: i64,
    title: String,
    author_id: i64,
}

record! {
    Entry in "entry" {
        columns: [id, title, author_id],
    }
}

const DEMO_SCHEMA: &str = "
    CREATE TABLE role (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT NOT NULL, role_id INTEGER);
    CREATE TABLE entry (id INTEGER PRIMARY KEY, title TEXT NOT NULL, author_id INTEGER REFERENCES author (id));
    INSERT INTO role VALUES (1, 'admin');
    INSERT INTO author VALUES (10, 'user 1', 1), (11, 'user 2', 2);
    INSERT INTO entry VALUES (100, 'article 1', 10), (101, 'article 2', 10);
";

fn load_settings() -> Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => config::load_config(path),
        None => match config::default_config_path() {
            Some(path) if path.exists() => config::load_config(path),
            _ => Ok(Config::default()),
        },
    }
}

fn run() -> Result<()> {
    let settings = load_settings()?;
    tracing_subscriber::fmt()
        .with_max_level(settings.logging.max_level()?)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting relbind demo...");

    let conn = db::connect(":memory:", &settings.sqlite)?;
    conn.execute_batch(DEMO_SCHEMA)?;
    let executor = QueryExecutor::new(&conn);

    let mut authors: Vec<Author> = Vec::new();
    {
        let mut model = Model::<Author>::from_sequence(&mut authors)?;
        let sql = format!("SELECT {} FROM author ORDER BY author.id", model.columns("").join(", "));
        executor.query(&mut model, &sql)?;

        let loader = Loader::new(&executor).with_config(settings.loader.clone());
        loader.load(&mut model, "role")?;
        loader.load(&mut model, "entries")?;
    }

    for author in &authors {
        let role = author.role.as_ref().map(|role| role.name.as_str()).unwrap_or("-");
        let titles: Vec<&str> = author.entries.iter().map(|entry| entry.title.as_str()).collect();
        println!("author {} {:?} role={} entries={:?}", author.id, author.name, role, titles);
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
