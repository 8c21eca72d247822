//! Operator CLI over the worldsmith core.
//!
//! # Responsibility
//! - Open (and migrate) one database, then run a single command against it.
//! - Print results as JSON on stdout; errors go to stderr with a non-zero exit.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;
use worldsmith_core::db::open_db;
use worldsmith_core::{
    core_version, default_log_level, init_logging, list_trash, ChangeFeed, EngineConfig,
    EntityKind, FeedCursor, FeedPage, SqliteSyncCursorRepository, WorldService,
};

#[derive(Parser, Debug)]
#[command(name = "worldsmith")]
#[command(version, about = "Inspect and maintain a worldsmith database")]
struct Cli {
    /// SQLite database file; created and migrated when missing
    #[arg(long, env = "WORLDSMITH_DB", default_value = "worldsmith.db")]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error); build default when unset
    #[arg(long, env = "WORLDSMITH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Directory for rotating log files; logging stays off when unset
    #[arg(long, env = "WORLDSMITH_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage worlds
    #[command(subcommand)]
    World(WorldCommand),
    /// List soft-deleted containers and cards of a world
    Trash {
        world_id: Uuid,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Page one entity family's change feed
    Feed {
        #[arg(value_parser = parse_entity)]
        entity: EntityKind,
        /// Resume from the cursor stored under this scope, and store the
        /// page's next cursor back
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, default_value_t = 0)]
        since: i64,
        #[arg(long)]
        after_id: Option<Uuid>,
        #[arg(long, default_value_t = 0)]
        take: usize,
    },
    /// Inspect persisted change-feed cursors
    #[command(subcommand)]
    Cursor(CursorCommand),
    /// Print the core version
    Version,
}

#[derive(Subcommand, Debug)]
enum WorldCommand {
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    List {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Match alive worlds by name or description
    Search {
        text: String,
        #[command(flatten)]
        page: PageArgs,
    },
    Delete { id: Uuid },
    Restore { id: Uuid },
    Purge { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum CursorCommand {
    /// List every cursor of a scope
    List { scope: String },
    Set {
        scope: String,
        #[arg(value_parser = parse_entity)]
        entity: EntityKind,
        updated_at: i64,
        after_id: Option<Uuid>,
    },
    Clear {
        scope: String,
        #[arg(value_parser = parse_entity)]
        entity: EntityKind,
    },
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = 0)]
    skip: usize,
    /// 0 uses the default page size
    #[arg(long, default_value_t = 0)]
    take: usize,
}

#[derive(Serialize)]
struct Affected {
    affected: usize,
}

fn parse_entity(raw: &str) -> Result<EntityKind, String> {
    EntityKind::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = EntityKind::ALL.iter().map(|kind| kind.as_str()).collect();
        format!("unknown entity `{raw}`, expected one of: {}", known.join(", "))
    })
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Explicit `--log-level`, else the build's default.
fn log_level(requested: Option<&str>) -> &str {
    requested.unwrap_or(default_log_level())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let log_dir = if log_dir.is_absolute() {
            log_dir.clone()
        } else {
            std::env::current_dir()?.join(log_dir)
        };
        let log_dir = log_dir
            .to_str()
            .ok_or_else(|| anyhow!("log dir is not valid UTF-8: {}", log_dir.display()))?;
        init_logging(log_level(cli.log_level.as_deref()), log_dir).map_err(|err| anyhow!(err))?;
    }
    info!("event=cli_start module=cli status=ok version={}", core_version());

    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database {}", cli.db.display()))?;
    let config = EngineConfig::default();

    match cli.command {
        Command::World(command) => {
            let worlds = WorldService::try_new(&conn)?.with_config(config);
            match command {
                WorldCommand::Create { name, description } => {
                    print_json(&worlds.create(&name, &description)?)
                }
                WorldCommand::List { page } => print_json(&worlds.list(page.skip, page.take)?),
                WorldCommand::Search { text, page } => {
                    print_json(&worlds.search(&text, page.skip, page.take)?)
                }
                WorldCommand::Delete { id } => print_json(&Affected {
                    affected: worlds.soft_delete(id)?,
                }),
                WorldCommand::Restore { id } => print_json(&Affected {
                    affected: worlds.restore(id)?,
                }),
                WorldCommand::Purge { id } => print_json(&Affected {
                    affected: worlds.purge(id)?,
                }),
            }
        }
        Command::Trash { world_id, page } => {
            print_json(&list_trash(&conn, &config, world_id, page.skip, page.take)?)
        }
        Command::Feed {
            entity,
            scope,
            since,
            after_id,
            take,
        } => {
            let cursors = SqliteSyncCursorRepository::try_new(&conn)?;
            let stored = match &scope {
                Some(scope) => cursors.get_cursor(scope, entity)?,
                None => None,
            };
            let cursor = stored.unwrap_or(FeedCursor {
                updated_at: since,
                after_id,
            });

            let feed = ChangeFeed::new(&conn).with_config(config);
            let next_cursor = match entity {
                EntityKind::World => emit_page(feed.worlds_since(&cursor, take)?)?,
                EntityKind::Container => emit_page(feed.containers_since(&cursor, take)?)?,
                EntityKind::Card => emit_page(feed.cards_since(&cursor, take)?)?,
                EntityKind::Tag => emit_page(feed.tags_since(&cursor, take)?)?,
                EntityKind::CardLayout => emit_page(feed.layouts_since(&cursor, take)?)?,
                EntityKind::BlockTemplate => {
                    emit_page(feed.block_templates_since(&cursor, take)?)?
                }
            };
            if let Some(scope) = &scope {
                cursors.set_cursor(scope, entity, &next_cursor)?;
            }
            Ok(())
        }
        Command::Cursor(command) => {
            let cursors = SqliteSyncCursorRepository::try_new(&conn)?;
            match command {
                CursorCommand::List { scope } => {
                    let entries: Vec<serde_json::Value> = cursors
                        .list_scope(&scope)?
                        .into_iter()
                        .map(|(entity, cursor)| {
                            serde_json::json!({ "entity": entity, "cursor": cursor })
                        })
                        .collect();
                    print_json(&entries)
                }
                CursorCommand::Set {
                    scope,
                    entity,
                    updated_at,
                    after_id,
                } => {
                    let cursor = FeedCursor {
                        updated_at,
                        after_id,
                    };
                    cursors.set_cursor(&scope, entity, &cursor)?;
                    print_json(&cursor)
                }
                CursorCommand::Clear { scope, entity } => print_json(&serde_json::json!({
                    "cleared": cursors.clear_cursor(&scope, entity)?,
                })),
            }
        }
        Command::Version => {
            println!("worldsmith_core version={}", core_version());
            Ok(())
        }
    }
}

fn emit_page<T: Serialize>(page: FeedPage<T>) -> Result<FeedCursor> {
    print_json(&page)?;
    Ok(page.next_cursor)
}

#[cfg(test)]
mod tests {
    use super::{log_level, Cli};
    use clap::Parser;
    use worldsmith_core::default_log_level;

    #[test]
    fn log_level_prefers_the_flag() {
        let cli = Cli::parse_from(["worldsmith", "--log-level", "trace", "version"]);
        assert_eq!(log_level(cli.log_level.as_deref()), "trace");
        assert_eq!(log_level(None), default_log_level());
    }
}
