//! Terminal interaction: REPL commands and output formatting

use anyhow::Result;
use manualbot_core::{CacheStats, CallMonitor, ChatTurn, SourceRef};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::orchestrator::{Answer, ConversationOrchestrator, ASK_CALL};

/// One line of REPL input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    Clear,
    ClearCache,
    Stats,
    History,
    Quit,
    Empty,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        if !line.starts_with('/') {
            return ReplCommand::Ask(line.to_string());
        }

        match line {
            "/clear" => ReplCommand::Clear,
            "/clear-cache" => ReplCommand::ClearCache,
            "/stats" => ReplCommand::Stats,
            "/history" => ReplCommand::History,
            "/quit" | "/exit" => ReplCommand::Quit,
            other => ReplCommand::Unknown(other.to_string()),
        }
    }
}

pub fn format_source(index: usize, source: &SourceRef) -> String {
    let location = match source.page {
        Some(page) => format!("{} (page {})", source.file, page),
        None => source.file.clone(),
    };
    format!("  [{}] {}\n      {}", index + 1, location, source.content.replace('\n', " "))
}

pub fn format_answer(answer: &Answer) -> String {
    let mut out = answer.text.clone();
    if answer.from_cache {
        out.push_str("\n(cached)");
    }
    if !answer.sources.is_empty() {
        out.push_str("\n\nSources:");
        for (i, source) in answer.sources.iter().enumerate() {
            out.push('\n');
            out.push_str(&format_source(i, source));
        }
    }
    out
}

/// Entry count and size on disk, the only figures that outlive a process
pub fn format_disk_usage(stats: &CacheStats) -> String {
    format!(
        "Cache Storage:\n  Entries:   {}\n  Size:      {:.2} MB",
        stats.entry_count,
        stats.size_mb()
    )
}

/// Request counters for this process plus disk usage
pub fn format_stats(stats: &CacheStats) -> String {
    format!(
        "Cache Statistics (this session):\n  Requests:  {}\n  Hits:      {}\n  Misses:    {}\n  Hit rate:  {:.1}%\n  Entries:   {}\n  Size:      {:.2} MB",
        stats.total_requests,
        stats.hits,
        stats.misses,
        stats.hit_rate_percent,
        stats.entry_count,
        stats.size_mb()
    )
}

pub fn format_history(turns: &[ChatTurn]) -> String {
    if turns.is_empty() {
        return "No conversation history.".to_string();
    }
    turns
        .iter()
        .enumerate()
        .map(|(i, turn)| format!("{}. Q: {}\n   A: {}", i + 1, turn.user, turn.assistant))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read questions and commands from `input` until `/quit` or end of input
pub async fn run_repl<R, W>(
    orchestrator: &mut ConversationOrchestrator,
    monitor: Option<&CallMonitor>,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let reply = match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Ask(question) => match orchestrator.ask(&question).await {
                Ok(answer) => format_answer(&answer),
                Err(e) => e.to_string(),
            },
            ReplCommand::Clear => {
                orchestrator.clear_memory();
                "Conversation history cleared.".to_string()
            }
            ReplCommand::ClearCache => match orchestrator.clear_cache() {
                Ok(removed) => format!("Removed {} cached answers.", removed),
                Err(e) => format!("Failed to clear cache: {}", e),
            },
            ReplCommand::Stats => {
                let mut text = match orchestrator.cache_stats() {
                    Some(stats) => format_stats(&stats),
                    None => "Cache is disabled.".to_string(),
                };
                if let Some(summary) = monitor.and_then(|m| m.summary(ASK_CALL)) {
                    text.push_str(&format!(
                        "\nQuestions: {} (avg {:.0} ms, {} failed)",
                        summary.call_count, summary.avg_duration_ms, summary.failures
                    ));
                }
                text
            }
            ReplCommand::History => format_history(orchestrator.history()),
            ReplCommand::Unknown(cmd) => format!(
                "Unknown command: {} (try /clear, /clear-cache, /stats, /history, /quit)",
                cmd
            ),
        };

        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }

    output.flush().await?;
    Ok(())
}
