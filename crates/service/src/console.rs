use std::io::Write;

use anyhow::Result;
use reportfinder_engine::{ChatReply, ReportEngine};
use tokio::io::{self, AsyncBufReadExt, BufReader};

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

/// Line-oriented chat on stdin/stdout. One session for the whole run.
pub async fn run(engine: &ReportEngine, session: Option<String>) -> Result<()> {
    let mut session_id = session;
    let mut lines = BufReader::new(io::stdin()).lines();
    println!("Ask for a report (type \"exit\" to leave).");
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if EXIT_WORDS.iter().any(|word| line.eq_ignore_ascii_case(word)) {
            break;
        }
        let reply = engine.process_message(session_id.as_deref(), line).await;
        print_reply(&reply);
        session_id = Some(reply.session_id);
    }
    Ok(())
}

fn print_reply(reply: &ChatReply) {
    println!("{}", reply.message);
    if let Some(url) = &reply.report_url {
        if !reply.message.contains(url.as_str()) {
            println!("{url}");
        }
    }
    println!("[{}]", reply.stage);
}
