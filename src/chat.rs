//! `ragchat ask` and the interactive `ragchat chat` loop.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use ragchat_core::conversation::Conversation;
use ragchat_core::models::{Answer, PipelineState};

use crate::assistant::Assistant;
use crate::config::Config;

/// Answer one question and print it with its sources.
pub async fn run_ask(config: Config, question: &str) -> Result<()> {
    let assistant = Assistant::open(config).await?;
    if assistant.state() == PipelineState::Uninitialized {
        eprintln!("note: the index is empty; run `ragchat ingest <paths>` first");
    }
    let answer = assistant.ask(question, &[]).await?;
    print_answer(&answer);
    Ok(())
}

/// Read questions from stdin until EOF or `/quit`. `/reset` clears the
/// conversation; the index is untouched.
pub async fn run_chat(config: Config) -> Result<()> {
    let assistant = Assistant::open(config).await?;
    let stats = assistant.stats();
    println!(
        "ragchat: {} entries from {} documents ({}). /reset clears history, /quit exits.",
        stats.entries,
        stats.documents.len(),
        stats.state
    );

    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                conversation.clear();
                println!("Conversation reset.");
                continue;
            }
            _ => {}
        }

        match assistant.ask(input, conversation.turns()).await {
            Ok(answer) => {
                print_answer(&answer);
                conversation.push_user(input);
                conversation.push_assistant(answer.answer, answer.sources);
            }
            // Keep the session alive; the service may recover.
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer);
    if answer.sources.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for (i, source) in answer.sources.iter().enumerate() {
        println!(
            "  [{}] {} (score {:.3})",
            i + 1,
            source.document_name,
            source.score
        );
        println!("      {}", source.chunk_excerpt.replace('\n', " "));
    }
}
