//! Interactive session (`spill shell`).
//!
//! Reads commands line by line from stdin and drives one
//! [`SessionController`]. Searches run in the background so a newer search
//! can be typed before an older one returns; only the newest is shown.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::commands::print_view;
use crate::enrich::{EnrichmentState, RequestOutcome};
use crate::job::JobState;
use crate::models::SortMode;
use crate::session::{SearchOutcome, SessionController};

const HELP: &str = "\
commands:
  search <query>     run a search (newest search wins)
  tag <name>         filter by tag (\"All\" clears the filter)
  sort <mode>        relevancy | newest | oldest
  page <n> | next | prev
  show               print the current page
  summarize <id>     request a summary for a result
  summary <id>       show a result's summary
  dismiss <id>       hide a result's summary
  add                open the add-article dialog
  url <link>         set the dialog's article URL
  submit             submit the dialog's URL
  job                show the ingestion job
  clear              dismiss a finished job
  close              close the dialog and cancel any job
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Search(String),
    Tag(String),
    Sort(SortMode),
    Page(usize),
    Next,
    Prev,
    Show,
    Summarize(String),
    Summary(String),
    Dismiss(String),
    OpenDialog,
    SetUrl(String),
    Submit,
    Job,
    ClearJob,
    CloseDialog,
    Help,
    Quit,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };

        let need = |what: &str| -> Result<String, String> {
            if rest.is_empty() {
                Err(format!("{} needs {}", word, what))
            } else {
                Ok(rest.to_string())
            }
        };

        let cmd = match word {
            "search" | "s" => ShellCommand::Search(need("a query")?),
            "tag" => ShellCommand::Tag(need("a tag name")?),
            "sort" => ShellCommand::Sort(need("a mode")?.parse()?),
            "page" => ShellCommand::Page(
                need("a number")?
                    .parse()
                    .map_err(|_| format!("not a page number: {}", rest))?,
            ),
            "next" | "n" => ShellCommand::Next,
            "prev" | "p" => ShellCommand::Prev,
            "show" => ShellCommand::Show,
            "summarize" => ShellCommand::Summarize(need("a result id")?),
            "summary" => ShellCommand::Summary(need("a result id")?),
            "dismiss" => ShellCommand::Dismiss(need("a result id")?),
            "add" => ShellCommand::OpenDialog,
            "url" => ShellCommand::SetUrl(need("a link")?),
            "submit" => ShellCommand::Submit,
            "job" => ShellCommand::Job,
            "clear" => ShellCommand::ClearJob,
            "close" => ShellCommand::CloseDialog,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" | "q" => ShellCommand::Quit,
            other => return Err(format!("unknown command: {} (try help)", other)),
        };
        Ok(Some(cmd))
    }
}

pub async fn run_shell(session: SessionController) -> Result<()> {
    let session = Arc::new(session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    while let Some(line) = lines.next_line().await? {
        let cmd = match ShellCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };
        if cmd == ShellCommand::Quit {
            break;
        }
        execute(&session, cmd).await;
    }

    session.close_ingest_dialog().await;
    Ok(())
}

async fn execute(session: &Arc<SessionController>, cmd: ShellCommand) {
    match cmd {
        ShellCommand::Search(query) => {
            let session = session.clone();
            tokio::spawn(async move {
                match session.search(&query).await {
                    Ok(SearchOutcome::Applied { .. }) => {
                        print_view(&session, &session.view().await)
                    }
                    Ok(SearchOutcome::Failed { status }) => println!("{}", status),
                    Ok(SearchOutcome::Superseded) => {
                        debug!(query = %query, "search superseded")
                    }
                    Err(e) => println!("{}", e),
                }
            });
        }
        ShellCommand::Tag(tag) => {
            if session.set_active_tag(&tag).await {
                print_view(session, &session.view().await);
            } else {
                println!("no such tag: {}", tag);
            }
        }
        ShellCommand::Sort(mode) => {
            session.set_sort_mode(mode).await;
            print_view(session, &session.view().await);
        }
        ShellCommand::Page(n) => turn_page(session, |_| n).await,
        ShellCommand::Next => turn_page(session, |current| current + 1).await,
        ShellCommand::Prev => turn_page(session, |current| current.saturating_sub(1)).await,
        ShellCommand::Show => print_view(session, &session.view().await),
        ShellCommand::Summarize(id) => match session.summarize(&id).await {
            Ok(RequestOutcome::Started) => println!("summarizing {}...", id),
            Ok(RequestOutcome::AlreadyLoading) => println!("{} is already loading", id),
            Err(e) => println!("{}", e),
        },
        ShellCommand::Summary(id) => {
            let entry = session.summary(&id);
            match entry.state {
                EnrichmentState::Idle => println!("no summary for {}", id),
                EnrichmentState::Loading => println!("{}: loading...", id),
                EnrichmentState::Ready => println!("{}", entry.text.unwrap_or_default()),
                EnrichmentState::Error => println!(
                    "{}: {}",
                    id,
                    entry.error_message.unwrap_or_default()
                ),
            }
        }
        ShellCommand::Dismiss(id) => {
            if !session.dismiss_summary(&id) {
                println!("no summary for {}", id);
            }
        }
        ShellCommand::OpenDialog => {
            session.open_ingest_dialog().await;
            println!("add article: set a link with `url <link>`, then `submit`");
        }
        ShellCommand::SetUrl(url) => {
            if !session.ingest_dialog().await.open {
                println!("open the dialog first with `add`");
                return;
            }
            session.set_ingest_url(&url).await;
        }
        ShellCommand::Submit => match session.submit_ingest().await {
            Ok(job) => print_job(&job),
            Err(e) => println!("{}", e),
        },
        ShellCommand::Job => print_job(&session.job()),
        ShellCommand::ClearJob => {
            if !session.jobs().dismiss().await {
                println!("no finished job to clear");
            }
        }
        ShellCommand::CloseDialog => session.close_ingest_dialog().await,
        ShellCommand::Help => println!("{}", HELP),
        ShellCommand::Quit => {}
    }
}

async fn turn_page(session: &SessionController, target: impl FnOnce(usize) -> usize) {
    let current = session.presented_page().await.page;
    if session.set_page(target(current)).await {
        print_view(session, &session.view().await);
    }
}

fn print_job(job: &crate::job::IngestionJob) {
    match job.state {
        JobState::Idle => println!("no ingestion job"),
        JobState::Submitting => println!("submitting..."),
        JobState::Polling => println!(
            "{}% {} ({})",
            job.progress_percent,
            job.current_step_label,
            job.status_message.as_deref().unwrap_or("")
        ),
        JobState::Succeeded => println!(
            "done: {}",
            job.status_message.as_deref().unwrap_or("Article added.")
        ),
        JobState::Failed => println!(
            "failed: {}",
            job.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}
