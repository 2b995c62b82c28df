pub mod dead_letters;
pub mod history;
pub mod replay;
pub mod route;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// dashbeam-events - Operator tooling for the event bus
#[derive(Debug, Parser)]
#[command(name = "dashbeam-events", version, about)]
pub struct Cli {
    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Re-publish dead-lettered events for a topic
    Replay {
        /// Topic whose dead letters are replayed (e.g. "quiz-events")
        #[arg(long)]
        topic: String,
    },

    /// List dead-lettered events for a topic
    DeadLetters {
        /// Topic to inspect
        #[arg(long)]
        topic: String,
    },

    /// Print a published event from history
    History {
        /// Event id
        #[arg(long)]
        id: Uuid,
    },

    /// Show the topic an event type is routed to
    Route {
        /// Event type tag (e.g. "quiz.answer.submitted")
        #[arg(long)]
        event_type: String,
    },
}
