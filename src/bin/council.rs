use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::io::Write;

use legal_council::models::{
    CaseType, CreateSessionRequest, GenerateOpinionRequest, InputType, ListSessionsQuery,
    MessagesQuery, SearchCasesRequest, SendMessageRequest, SessionStatusFilter, StatisticsQuery,
    TargetAgent,
};
use legal_council::stream::{ChatMessage, StreamError};
use legal_council::{CancellationToken, CouncilClient, CouncilState};

#[derive(Debug, Parser)]
#[command(name = "council", about = "Talk to the virtual judicial deliberation room")]
struct Cli {
    /// Base URL of the deliberation server
    #[arg(long, env = "COUNCIL_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a deliberation session for a case summary
    New {
        summary: String,
        #[arg(long)]
        case_type: Option<CaseType>,
    },
    /// Send a message to a session and stream the judges' answers
    Ask {
        session_id: String,
        message: String,
        /// all, strict, humanist or historian
        #[arg(long)]
        target: Option<TargetAgent>,
    },
    /// List deliberation sessions
    Sessions {
        /// active, concluded, archived or all
        #[arg(long, default_value = "all")]
        status: SessionStatusFilter,
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show a session's transcript
    History {
        session_id: String,
        #[arg(long)]
        limit: Option<i64>,
        /// Only messages older than this message id
        #[arg(long)]
        before: Option<uuid::Uuid>,
    },
    /// Archive a session
    Archive { session_id: String },
    /// Draft the legal opinion and conclude the session
    Opinion {
        session_id: String,
        #[arg(long)]
        no_dissent: bool,
    },
    /// Search the case database
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Sentencing statistics over completed judgments
    Stats {
        #[arg(long)]
        case_type: Option<CaseType>,
    },
}

/// Prints streamed messages incrementally. Interleaved agents each keep
/// their own printed offset.
#[derive(Default)]
struct TurnPrinter {
    printed: HashMap<usize, usize>,
    current: Option<usize>,
}

impl TurnPrinter {
    fn show(&mut self, index: usize, message: &ChatMessage) {
        if message.is_from_user() {
            println!("{}: {}", message.sender_name, message.content);
            self.current = None;
            return;
        }

        let printed = self.printed.entry(index).or_insert(0);
        let delta = message.content.get(*printed..).unwrap_or_default();
        if self.current != Some(index) && (!delta.is_empty() || *printed == 0) {
            let marker = if *printed == 0 { "" } else { "…" };
            print!("\n[{}] {}", message.sender_name, marker);
            self.current = Some(index);
        }
        print!("{}", delta);
        *printed = message.content.len();
        let _ = std::io::stdout().flush();

        if !message.streaming {
            println!();
            if let Some(citations) = &message.citations {
                for case in &citations.cases {
                    println!("  ↳ case: {}", case);
                }
                for law in &citations.laws {
                    println!("  ↳ law: {}", law);
                }
            }
            self.current = None;
        }
    }
}

async fn ask(
    client: &CouncilClient,
    session_id: String,
    message: String,
    target: Option<TargetAgent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = CouncilState::new();
    state.session_id = Some(session_id.clone());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel().await;
            }
        });
    }

    let request = SendMessageRequest {
        target_agent: target,
        ..SendMessageRequest::new(message)
    };

    let mut printer = TurnPrinter::default();
    let mut failure: Option<StreamError> = None;
    {
        let mut assembler = state.begin_turn()?;
        client
            .stream_turn(
                &session_id,
                &request,
                &mut assembler,
                &cancel,
                |index, m| printer.show(index, m),
                || log::debug!("Turn finished"),
                |e| failure = Some(e),
            )
            .await;
    }
    state.finish_turn();

    println!("\n──── transcript ────");
    for message in &state.messages {
        println!("{} ({}): {}", message.sender_name, message.id, message.content);
    }

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

async fn opinion(
    client: &CouncilClient,
    session_id: String,
    include_dissent: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = CouncilState::new();
    state.session_id = Some(session_id.clone());

    let response = client
        .generate_opinion(&session_id, &GenerateOpinionRequest { include_dissent })
        .await?;
    state.opinion = response.get("opinion").cloned();

    if let Some(opinion) = &state.opinion {
        println!("{}", serde_json::to_string_pretty(opinion)?);
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let client = CouncilClient::new(&cli.api_url);

    match cli.command {
        Command::New { summary, case_type } => {
            let response = client
                .create_session(&CreateSessionRequest {
                    input_type: InputType::TextSummary,
                    case_summary: summary,
                    case_type,
                    structured_data: None,
                })
                .await?;
            println!("session: {}", response["session_id"].as_str().unwrap_or("?"));
            if let Some(content) = response["initial_message"]["content"].as_str() {
                println!("\n{}", content);
            }
        }
        Command::Ask {
            session_id,
            message,
            target,
        } => ask(&client, session_id, message, target).await?,
        Command::Sessions {
            status,
            page,
            limit,
        } => {
            let query = ListSessionsQuery {
                status,
                page,
                limit,
            };
            print_json(&client.list_sessions(&query).await?)?;
        }
        Command::History {
            session_id,
            limit,
            before,
        } => {
            let query = MessagesQuery { limit, before };
            print_json(&client.get_messages(&session_id, &query).await?)?;
        }
        Command::Archive { session_id } => {
            let response = client.archive_session(&session_id).await?;
            println!("{}", response["message"].as_str().unwrap_or("archived"));
        }
        Command::Opinion {
            session_id,
            no_dissent,
        } => opinion(&client, session_id, !no_dissent).await?,
        Command::Search { query, limit } => {
            let request = SearchCasesRequest {
                limit,
                ..SearchCasesRequest::new(query)
            };
            print_json(&client.search_cases(&request).await?)?;
        }
        Command::Stats { case_type } => {
            print_json(&client.case_statistics(&StatisticsQuery { case_type }).await?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(sender: &str, content: &str, streaming: bool) -> ChatMessage {
        ChatMessage {
            id: format!("pending-{}", sender),
            sender: sender.to_string(),
            sender_name: format!("Judge {}", sender),
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
            citations: None,
            streaming,
        }
    }

    #[test]
    fn test_interleaved_agents_keep_their_offsets() {
        let mut printer = TurnPrinter::default();
        printer.show(1, &agent("strict", "Pasal ", true));
        printer.show(2, &agent("humanist", "Terdakwa ", true));
        printer.show(1, &agent("strict", "Pasal 112", true));
        printer.show(2, &agent("humanist", "Terdakwa masih muda", true));

        assert_eq!(printer.printed[&1], "Pasal 112".len());
        assert_eq!(printer.printed[&2], "Terdakwa masih muda".len());
        assert_eq!(printer.current, Some(2));

        printer.show(1, &agent("strict", "Pasal 112", false));
        assert_eq!(printer.printed[&1], "Pasal 112".len());
        assert_eq!(printer.current, None);
    }

    #[test]
    fn test_parse_history_arguments() {
        let cli = Cli::try_parse_from([
            "council",
            "history",
            "s1",
            "--before",
            "0192a5d0-3c4e-7f00-8000-000000000001",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::History { before: Some(_), .. }));

        let cli = Cli::try_parse_from(["council", "sessions", "--status", "archived"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Sessions { status: SessionStatusFilter::Archived, .. }
        ));
    }
}
