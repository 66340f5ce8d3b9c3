use std::sync::Arc;

use chatstream::app::attachment::load_attachment;
use chatstream::app::repl::{HELP, Input, Renderer, parse_line};
use chatstream::app::services::{ConversationService, PendingTasks, ShutdownCoordinator};
use chatstream::backend::new_backend;
use chatstream::cli::Command;
use chatstream::config::{Configuration, init_logger, verbose};
use chatstream::models::{Action, Attachment, Event};
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Command::new();
    if cmd.version() {
        cmd.print_version();
        return Ok(());
    }

    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let config = cmd.get_config()?;
    Configuration::init(config.clone())?;
    init_logger(&config.log)?;
    verbose!("[+] Logger initialized");

    verbose!("[+] Initializing backend...");
    let backend = new_backend(&config.server).wrap_err("initializing backend")?;
    verbose!("[+] Using {}", config.server.endpoint);

    let config_id = cmd.config_id(&config).map(String::from);
    if config_id.is_none() {
        verbose!("[!] No model configuration selected, use /config <id>");
    }

    let (action_tx, action_rx) = mpsc::unbounded_channel::<Action>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let token = CancellationToken::new();
    let pending_tasks = PendingTasks::new();

    let mut service = ConversationService::new(
        backend,
        action_rx,
        Arc::new(event_tx),
        token.clone(),
        pending_tasks.clone(),
    )
    .with_config_id(config_id);
    let service_task = tokio::spawn(async move { service.run().await });

    if let Some(id) = cmd.conversation() {
        action_tx.send(Action::OpenConversation(Some(id.to_string())))?;
    }

    let mut renderer = Renderer::new();
    let mut attachments: Vec<Attachment> = vec![];
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                if let Err(err) = renderer.render(&mut stdout, &event) {
                    log::error!("Failed to render event: {}", err);
                }
            }

            line = lines.next_line() => {
                let Some(line) = line.wrap_err("reading stdin")? else {
                    break;
                };
                match parse_line(&line) {
                    Input::Action(Action::Send { content, .. }) => {
                        action_tx.send(Action::Send {
                            content,
                            attachments: std::mem::take(&mut attachments),
                        })?;
                    }
                    Input::Action(action) => action_tx.send(action)?,
                    Input::Attach { path, name } => {
                        match load_attachment(&path, name.as_deref()).await {
                            Ok(attachment) => {
                                println!("# attached {} ({} bytes)", attachment.name, attachment.size);
                                attachments.push(attachment);
                            }
                            Err(err) => eprintln!("! {:#}", err),
                        }
                    }
                    Input::ShowBranches => renderer.render_branches(&mut stdout)?,
                    Input::Help => println!("{}", HELP),
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Invalid(message) => eprintln!("{}", message),
                }
            }
        }
    }

    // The service stops a running response on cancel and tracks its
    // server-side cancel before returning.
    token.cancel();
    match service_task.await {
        Ok(Err(err)) => log::error!("Conversation service error: {}", err),
        Ok(Ok(())) => {}
        Err(err) => log::error!("Conversation service failed: {}", err),
    }

    if let Err(err) = ShutdownCoordinator::new(pending_tasks)
        .wait_for_completion()
        .await
    {
        eprintln!("Shutdown error: {}", err);
    }

    Ok(())
}
