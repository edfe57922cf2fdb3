pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod models;
pub mod similarity;
pub mod store;

use cli::{ Args, Command };
use config::GatewayConfig;
use error::Result;
use futures::StreamExt;
use gateway::{ ChatOptions, Gateway };
use log::info;
use std::io::Write;

pub async fn run(args: Args) -> Result<()> {
    let config = GatewayConfig::from_args(&args)?;
    config.log_summary();

    let gateway = Gateway::new(&config)?;
    execute(&gateway, args.command).await
}

async fn execute(gateway: &Gateway, command: Command) -> Result<()> {
    match command {
        Command::Chat { prompt, system, temperature, max_tokens, conversation } => {
            let options = ChatOptions {
                system,
                temperature,
                max_tokens,
                conversation_id: conversation,
            };
            let reply = gateway.chat(&prompt, options).await?;
            println!("{}", reply);
        }
        Command::Stream { prompt, system } => {
            let mut stream = gateway.chat_stream(&prompt, system.as_deref());
            let mut stdout = std::io::stdout();
            while let Some(fragment) = stream.next().await {
                print!("{}", fragment?);
                stdout.flush().ok();
            }
            println!();
        }
        Command::Json { prompt, schema } => {
            let value = gateway.chat_json(&prompt, &schema).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Embed { texts } => {
            for record in gateway.embed_and_store(&texts).await? {
                println!("{}\t{} dims\t{}", record.id, record.embedding.len(), record.text);
            }
        }
        Command::Search { query, limit } => {
            for record in gateway.search(&query, limit).await? {
                println!("{}\t{}", record.id, record.text);
            }
        }
        Command::Similarity { first, second } => {
            println!("{:.4}", gateway.similarity(&first, &second).await?);
        }
        Command::NewConversation { title, model } => {
            let conversation = gateway.conversation_store().create(title, &model).await?;
            println!("{}\t{}", conversation.id, conversation.title.as_deref().unwrap_or(""));
        }
        Command::RenameConversation { id, title } => {
            let conversation = gateway.conversation_store().update(id, Some(title)).await?;
            info!("Conversation {} is now titled '{}'", id, conversation.title.as_deref().unwrap_or(""));
        }
        Command::Conversations => {
            for conversation in gateway.conversation_store().get_all().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    conversation.id,
                    conversation.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    conversation.model_name,
                    conversation.title.as_deref().unwrap_or("")
                );
            }
        }
        Command::History { conversation } => {
            for message in gateway.conversation_store().get_messages(conversation).await? {
                println!("[{}] {}: {}", message.created_at.format("%H:%M:%S"), message.role, message.content);
            }
        }
        Command::DeleteEmbedding { id } => {
            gateway.embedding_store().delete(id).await?;
            info!("Deleted embedding {}", id);
        }
        Command::DeleteConversation { id } => {
            gateway.conversation_store().delete(id).await?;
            info!("Deleted conversation {}", id);
        }
    }
    Ok(())
}
