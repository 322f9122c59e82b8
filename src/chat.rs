// Terminal chat client for the NIC server.
// Conversations live in memory only and are gone once the client exits.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use futures::StreamExt;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::{DEFAULT_CONVERSATION_TITLE, MAX_MESSAGES, TITLE_HEADER};
use crate::error::ErrorBody;
use crate::models::{ChatMessage, ChatReply};

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Local>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            messages: Vec::new(),
            created_at: Local::now(),
        }
    }

    /// The most recent messages that fit in one request.
    pub fn history(&self) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(MAX_MESSAGES);
        &self.messages[start..]
    }

    fn apply_title(&mut self, title: Option<String>) {
        if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
            self.title = title;
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Every conversation of the session, with one of them active.
#[derive(Debug)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active: usize,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: vec![Conversation::new()],
            active: 0,
        }
    }

    /// Starts a new conversation and makes it active.
    pub fn create(&mut self) -> &Conversation {
        self.conversations.push(Conversation::new());
        self.active = self.conversations.len() - 1;
        &self.conversations[self.active]
    }

    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> &Conversation {
        &self.conversations[self.active]
    }

    pub fn active_mut(&mut self) -> &mut Conversation {
        &mut self.conversations[self.active]
    }

    pub fn switch(&mut self, index: usize) -> Result<&Conversation> {
        if index >= self.conversations.len() {
            return Err(anyhow!(
                "no conversation {} (have {})",
                index,
                self.conversations.len()
            ));
        }
        self.active = index;
        Ok(&self.conversations[index])
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client for the chat endpoints.
pub struct ChatClient {
    http: reqwest::Client,
    server: String,
}

impl ChatClient {
    pub fn new(server: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }

    pub async fn send(&self, messages: &[ChatMessage]) -> Result<ChatReply> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.server))
            .json(&serde_json::json!({ "messages": messages }))
            .send()
            .await
            .context("Failed to reach the NIC server")?;

        if !response.status().is_success() {
            return Err(server_error(response).await);
        }
        response
            .json::<ChatReply>()
            .await
            .context("Failed to parse chat reply")
    }

    /// Streams the reply, handing each chunk to `on_token`; returns the title and full text.
    pub async fn send_streaming<F>(
        &self,
        messages: &[ChatMessage],
        mut on_token: F,
    ) -> Result<ChatReply>
    where
        F: FnMut(&str),
    {
        let response = self
            .http
            .post(format!("{}/api/chat/stream", self.server))
            .json(&serde_json::json!({ "messages": messages }))
            .send()
            .await
            .context("Failed to reach the NIC server")?;

        if !response.status().is_success() {
            return Err(server_error(response).await);
        }

        let title = response
            .headers()
            .get(TITLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| urlencoding::decode(v).ok())
            .map(|v| v.into_owned());

        let mut raw = Vec::new();
        let mut printed = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Reply stream was interrupted")?;
            raw.extend_from_slice(&chunk);
            // Only hand out complete UTF-8 sequences
            let valid = match std::str::from_utf8(&raw[printed..]) {
                Ok(s) => s.len(),
                Err(e) => e.valid_up_to(),
            };
            if valid > 0 {
                let text = std::str::from_utf8(&raw[printed..printed + valid])
                    .context("Reply stream was not valid UTF-8")?;
                on_token(text);
                printed += valid;
            }
        }

        let message = String::from_utf8(raw).context("Reply stream was not valid UTF-8")?;
        Ok(ChatReply { title, message })
    }
}

async fn server_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => anyhow!("error ({}): {}", body.code, body.error),
        Err(_) => anyhow!("server answered with status {}", status),
    }
}

/// Sends `input` in the active conversation, recording the reply or rolling back on failure.
pub async fn exchange<F>(
    client: &ChatClient,
    store: &mut ConversationStore,
    input: &str,
    stream: bool,
    on_token: F,
) -> Result<String>
where
    F: FnMut(&str),
{
    let conversation = store.active_mut();
    conversation.messages.push(ChatMessage::user(input));
    let history = conversation.history().to_vec();

    let outcome = if stream {
        client.send_streaming(&history, on_token).await
    } else {
        client.send(&history).await
    };

    let conversation = store.active_mut();
    match outcome {
        Ok(reply) => {
            conversation.apply_title(reply.title);
            conversation
                .messages
                .push(ChatMessage::assistant(reply.message.clone()));
            Ok(reply.message)
        }
        Err(e) => {
            conversation.messages.pop();
            Err(e)
        }
    }
}

enum Command {
    New,
    List,
    Switch(usize),
    Quit,
    Say(String),
    Invalid(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let command = match line {
        "/new" => Command::New,
        "/list" => Command::List,
        "/quit" | "/exit" => Command::Quit,
        _ if line.starts_with("/switch") => match line["/switch".len()..].trim().parse() {
            Ok(index) => Command::Switch(index),
            Err(_) => Command::Invalid("usage: /switch <number>".to_string()),
        },
        _ if line.starts_with('/') => Command::Invalid(format!("unknown command: {}", line)),
        _ => Command::Say(line.to_string()),
    };
    Some(command)
}

/// Interactive loop reading from stdin until `/quit` or end of input.
pub async fn run_chat(server: &str, stream: bool) -> Result<()> {
    info!(%server, stream, "Starting chat client");
    let client = ChatClient::new(server);
    let mut store = ConversationStore::new();

    println!("NIC chat. Commands: /new, /list, /switch <n>, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match parse_command(&line) {
            None => continue,
            Some(Command::Quit) => break,
            Some(Command::New) => {
                store.create();
                println!("Started a new conversation.");
            }
            Some(Command::List) => {
                for (i, c) in store.list().iter().enumerate() {
                    let marker = if i == store.active_index() { "*" } else { " " };
                    println!(
                        "{} [{}] {} ({} messages, {})",
                        marker,
                        i,
                        c.title,
                        c.messages.len(),
                        c.created_at.format("%H:%M:%S")
                    );
                }
            }
            Some(Command::Switch(index)) => match store.switch(index) {
                Ok(c) => println!("Switched to: {}", c.title),
                Err(e) => println!("{}", e),
            },
            Some(Command::Invalid(msg)) => println!("{}", msg),
            Some(Command::Say(text)) => {
                print!("nic> ");
                std::io::stdout().flush().ok();
                let result = exchange(&client, &mut store, &text, stream, |token| {
                    print!("{}", token);
                    std::io::stdout().flush().ok();
                })
                .await;
                match result {
                    Ok(reply) => {
                        if stream {
                            println!();
                        } else {
                            println!("{}", reply);
                        }
                        debug!(title = %store.active().title, "Exchange complete");
                    }
                    Err(e) => println!("\n{}", e),
                }
            }
        }
    }
    println!("Bye.");
    Ok(())
}
