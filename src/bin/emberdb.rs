//! Line-oriented REPL over the storage engine: `GET <key>`,
//! `PUT <key> <value>`, `EXIT`.

use std::io::{self, BufRead};
use std::process::ExitCode;

use emberdb::{Config, Db};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let db = match Db::open(Config::default()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error while setting up DB: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let args: Vec<&str> = line.split(' ').collect();
        match args[0] {
            "GET" => cmd_get(&db, &args),
            "PUT" => cmd_put(&db, &args),
            "EXIT" => break,
            _ => println!("Command not supported"),
        }
    }

    ExitCode::SUCCESS
}

fn cmd_get(db: &Db, args: &[&str]) {
    if args.len() != 2 {
        eprintln!("Expected exactly 1 argument for GET command");
        return;
    }
    let key = args[1];
    match db.get(key) {
        Ok(Some(value)) => println!("GET {key} returned: {value}"),
        Ok(None) => println!("No value found for GET {key}"),
        Err(e) => println!("No value found for GET {key}. Error: {e}"),
    }
}

fn cmd_put(db: &Db, args: &[&str]) {
    if args.len() != 3 {
        eprintln!("Expected exactly 2 arguments for PUT command");
        return;
    }
    match db.put(args[1], args[2]) {
        Ok(()) => println!("PUT operation performed successfully"),
        Err(e) => println!("Error while performing PUT operation: '{e}'"),
    }
}
