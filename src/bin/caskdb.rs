use std::env::current_dir;
use std::process::exit;

use caskdb::{Bitcask, Storage, StorageError, StorageResult};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(name = "get")]
    Get(GetCommand),
    #[command(name = "set")]
    Set(SetCommand),
    #[command(name = "rm")]
    Remove(RemoveCommand),
    #[command(name = "keys")]
    Keys,
}

#[derive(Args, Debug)]
struct GetCommand {
    key: String,
}

#[derive(Args, Debug)]
struct SetCommand {
    key: String,
    value: String,
}

#[derive(Args, Debug)]
struct RemoveCommand {
    key: String,
}

fn main() -> StorageResult<()> {
    let cli = Cli::parse();
    let mut store = Bitcask::open(current_dir()?)?;
    let mut exit_code = 0;

    match cli.command {
        Command::Get(GetCommand { key }) => match store.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("Key not found"),
        },
        Command::Set(SetCommand { key, value }) => {
            store.set(key.as_bytes(), value.as_bytes())?;
        }
        Command::Remove(RemoveCommand { key }) => match store.remove(key.as_bytes()) {
            Ok(()) => {}
            Err(StorageError::KeyNotFound) => {
                println!("Key not found");
                exit_code = 1;
            }
            Err(e) => return Err(e),
        },
        Command::Keys => {
            for key in store.list_keys() {
                println!("{}", String::from_utf8_lossy(&key));
            }
        }
    }

    // `exit` skips destructors, so the store is torn down first.
    store.close()?;
    if exit_code != 0 {
        exit(exit_code);
    }
    Ok(())
}
