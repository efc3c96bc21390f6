//! CLI subcommands.

use chrono::NaiveDate;
use clap::{Args, Subcommand};

use crate::hooks::ContentFilter;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Agenda, journey, medical record and recommended content at a glance
  #[command(alias = "d")]
  Dashboard,

  /// List active notifications
  #[command(alias = "n")]
  Notifications {
    /// Keep polling and print changes until Ctrl-C
    #[arg(short, long)]
    watch: bool,
  },

  /// Mark a notification as read
  Read { id: i64 },

  /// Achieved milestones not yet celebrated
  #[command(alias = "m")]
  Milestones,

  /// Dismiss a milestone prompt
  Celebrate { id: i64 },

  /// Calendar events, optionally within a date window
  #[command(alias = "c")]
  Calendar {
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Pull from the connected external calendar first
    #[arg(long)]
    sync: bool,
  },

  /// Browse the content library
  Content(ContentArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
#[group(multiple = false)]
pub struct ContentArgs {
  #[arg(long)]
  pub specialty: Option<i64>,
  #[arg(long)]
  pub category: Option<String>,
  #[arg(long)]
  pub recommended: bool,
}

impl ContentArgs {
  pub fn filter(&self) -> ContentFilter {
    if let Some(id) = self.specialty {
      ContentFilter::Specialty(id)
    } else if let Some(name) = &self.category {
      ContentFilter::Category(name.clone())
    } else if self.recommended {
      ContentFilter::Recommended
    } else {
      ContentFilter::All
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Result<Command, clap::Error> {
    Cli::try_parse_from(std::iter::once("carelink").chain(args.iter().copied())).map(|c| c.command)
  }

  #[test]
  fn test_content_filters() {
    let Command::Content(args) = parse(&["content", "--category", "nutrition"]).unwrap() else {
      panic!("expected content");
    };
    assert_eq!(args.filter(), ContentFilter::Category("nutrition".into()));

    let Command::Content(args) = parse(&["content"]).unwrap() else {
      panic!("expected content");
    };
    assert_eq!(args.filter(), ContentFilter::All);
  }

  #[test]
  fn test_content_filters_are_exclusive() {
    assert!(parse(&["content", "--specialty", "2", "--recommended"]).is_err());
  }

  #[test]
  fn test_calendar_dates() {
    let command = parse(&["calendar", "--start", "2026-03-01", "--sync"]).unwrap();
    assert_eq!(
      command,
      Command::Calendar {
        start: NaiveDate::from_ymd_opt(2026, 3, 1),
        end: None,
        sync: true,
      }
    );
  }

  #[test]
  fn test_aliases() {
    assert_eq!(
      parse(&["n", "--watch"]).unwrap(),
      Command::Notifications { watch: true }
    );
  }
}
