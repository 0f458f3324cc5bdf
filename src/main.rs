use std::{
    env,
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
};

use interstellar::{Database, DatabaseOptions, IndexKey, Schema, storage::schema::AlternativeShape};
use rustyline::{DefaultEditor, error::ReadlineError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const HISTORY_FILE: &str = ".interstellar_history";

fn read_multiline_command(rl: &mut DefaultEditor) -> rustyline::Result<String> {
    let mut input = String::new();
    let mut prompt = "interstellar> ".to_string();

    loop {
        let line = rl.readline(&prompt)?;
        let trimmed_line = line.trim_end();

        // Trailing backslash continues the command on the next line
        if let Some(continued) = trimmed_line.strip_suffix('\\') {
            input.push_str(continued);
            input.push(' ');
            prompt = "           -> ".to_string();
        } else {
            input.push_str(trimmed_line);
            break;
        }
    }

    Ok(input)
}

/// Entry and structure names typed at the prompt. Purely numeric names
/// address INTEGER keys.
fn parse_key(word: &str) -> IndexKey {
    word.parse::<i32>()
        .map(IndexKey::Integer)
        .unwrap_or_else(|_| IndexKey::from(word))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(err) => println!("Error: {}", err),
    }
}

fn describe_schema(schema: &Schema, depth: usize) -> String {
    let indent = "  ".repeat(depth);
    let mut out = String::new();
    for (name, overload) in schema.fields() {
        out.push_str(&format!("{}{}: {}\n", indent, name, overload.allowed));
        for alternative in &overload.alternatives {
            match alternative {
                AlternativeShape::Structure(nested) => {
                    out.push_str(&format!("{}  | STRUCTURE\n", indent));
                    out.push_str(&describe_schema(nested, depth + 2));
                }
                AlternativeShape::ArrayOf(element) => {
                    out.push_str(&format!("{}  | ARRAY OF {}\n", indent, element.allowed));
                }
            }
        }
    }
    out
}

fn run_command(db: &Database, command: &str) -> interstellar::Result<bool> {
    let words: Vec<&str> = command.split_whitespace().collect();
    let (head, args) = match words.split_first() {
        Some((head, args)) => (head.to_lowercase(), args),
        None => return Ok(true),
    };

    match (head.as_str(), args) {
        ("exit" | "quit" | "q", _) => {
            println!("Goodbye!");
            return Ok(false);
        }
        ("help" | "h", _) => {
            println!(
                r#"
Available commands:
  structures                  - List structure names
  entries <structure>         - List entry names of a structure
  get <structure> <entry>     - Print one entry as JSON
  dump <structure>            - Print every entry of a structure as JSON
  schema <structure>          - Show the schema of a structure
  info                        - Show header information
  help, h                     - Show this help message
  clear, ctrl + l             - Clear the screen
  exit, quit, q               - Exit the inspector

Use '\' at the end of a line for multiline input.
Use Up/Down arrows to navigate command history.
"#
            );
        }
        ("clear", _) => {
            print!("\x1B[2J\x1B[1;1H");
            std::io::stdout().flush()?;
        }
        ("structures", []) => print_json(&db.list_structures()),
        ("entries", [structure]) => print_json(&db.list_entries(parse_key(structure))?),
        ("get", [structure, entry]) => {
            print_json(&db.get_entry(parse_key(structure), parse_key(entry))?)
        }
        ("dump", [structure]) => {
            let structure = parse_key(structure);
            let keys = db.list_entries(&structure)?;
            let entries = db.get_all_entries(&structure)?;
            let mut dump = serde_json::Map::new();
            for (key, entry) in keys.iter().zip(&entries) {
                let value = serde_json::to_value(entry).map_err(std::io::Error::from)?;
                dump.insert(key.to_string(), value);
            }
            print_json(&dump);
        }
        ("schema", [structure]) => print!("{}", describe_schema(db.schema(parse_key(structure))?, 0)),
        ("info", []) => {
            let header = db.header();
            println!("format version : {}", header.format_version);
            println!(
                "offsets        : {}",
                if header.wide_offsets { "64-bit" } else { "32-bit" }
            );
            if let Some(created) = header.created_at() {
                println!("created        : {}", created.to_rfc3339());
            }
            if let Some(updated) = header.updated_at() {
                println!("updated        : {}", updated.to_rfc3339());
            }
            println!("structures     : {}", db.list_structures().len());
            println!("decoded        : {}", db.decode_count());
        }
        _ => println!("Unknown command or wrong arguments: '{}'. Type 'help'.", command),
    }

    Ok(true)
}

fn history_path() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(HISTORY_FILE)
}

fn repl(db: &Database) -> rustyline::Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = history_path();
    // Missing on first run
    let _ = rl.load_history(&history);

    loop {
        match read_multiline_command(&mut rl) {
            Ok(input) => {
                let command = input.trim().to_string();
                if command.is_empty() {
                    continue;
                }
                rl.add_history_entry(&command)?;
                match run_command(db, &command) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => println!("Error: {}", err),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("EOF");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Err(err) = rl.save_history(&history) {
        error!("Failed to save history: {}", err);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: interstellar <file>");
        return ExitCode::FAILURE;
    };
    let path = Path::new(&path);

    let db = match Database::open(path, DatabaseOptions::new()) {
        Ok(db) => db,
        Err(err) => {
            error!("Failed to open database {}: {}", path.display(), err);
            return ExitCode::FAILURE;
        }
    };
    info!(
        structures = db.list_structures().len(),
        "Opened {}",
        path.display()
    );

    println!("INTERSTELLAR database inspector. Type 'help' for commands.");
    match repl(&db) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Inspector failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
