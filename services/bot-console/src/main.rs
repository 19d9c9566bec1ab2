//! Bot Console - operator console for market bots
//!
//! A line-oriented stand-in for the dashboard:
//! 1. Polls the bot service for running bots
//! 2. Shows the reconciled bot list and any error notice
//! 3. Starts and stops bots with optimistic feedback

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use bot_console::{
    BotService, BotServiceClient, CommandExecutor, Config, DraftConfig, DraftField, MarketId,
    Notice, NoticeBoard, PollStatus, Poller, PollerHandle, SessionStore, SessionView,
};

/// Bot console entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Logs go to stderr so they don't interleave with the bot list
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Bot Console...");
    info!("Bot service: {}", config.api_base_url);

    let service: Arc<dyn BotService> = Arc::new(BotServiceClient::from_config(&config)?);
    let store = SessionStore::new();
    let notices = NoticeBoard::new();

    let poller = Poller::new(Arc::clone(&service), store.clone(), notices.clone())
        .with_interval(config.poll_interval())
        .activate();
    let executor = CommandExecutor::new(service, store.clone(), notices.clone());

    let result = Console::new(store, notices, executor).run(&poller).await;

    poller.deactivate();
    info!("Bot console stopped");
    result
}

/// Operator input, one per line
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleCommand {
    List,
    Select(MarketId),
    Set { field: DraftField, value: String },
    /// Without args, starts the selected market from the draft
    Start(Option<StartArgs>),
    Stop(MarketId),
    Dismiss,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StartArgs {
    market_id: MarketId,
    size: String,
    up: String,
    down: String,
}

impl ConsoleCommand {
    /// Parse a console line; blank lines yield `None`
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = parts.collect();

        let cmd = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("list" | "ls", []) => ConsoleCommand::List,
            ("select", [market]) => ConsoleCommand::Select(MarketId::from(*market)),
            ("set", [field, value]) => ConsoleCommand::Set {
                field: field.parse()?,
                value: value.to_string(),
            },
            ("start", []) => ConsoleCommand::Start(None),
            ("start", [market, size, up, down]) => ConsoleCommand::Start(Some(StartArgs {
                market_id: MarketId::from(*market),
                size: size.to_string(),
                up: up.to_string(),
                down: down.to_string(),
            })),
            ("stop", [market]) => ConsoleCommand::Stop(MarketId::from(*market)),
            ("dismiss", []) => ConsoleCommand::Dismiss,
            ("help" | "?", []) => ConsoleCommand::Help,
            ("quit" | "exit", []) => ConsoleCommand::Quit,
            _ => return Err(format!("Unrecognized command: {} (try 'help')", line.trim())),
        };
        Ok(Some(cmd))
    }
}

/// Results from spawned commands that the console loop must act on
enum ConsoleEvent {
    Started { market_id: MarketId },
}

struct Console {
    store: SessionStore,
    notices: NoticeBoard,
    executor: CommandExecutor,
    draft: DraftConfig,
}

impl Console {
    fn new(store: SessionStore, notices: NoticeBoard, executor: CommandExecutor) -> Self {
        Self {
            store,
            notices,
            executor,
            draft: DraftConfig::new(),
        }
    }

    async fn run(mut self, poller: &PollerHandle) -> anyhow::Result<()> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut sessions = self.store.subscribe();
        let mut notices = self.notices.subscribe();

        print_help();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    // EOF quits like `quit`
                    let Some(line) = line? else { break };
                    match ConsoleCommand::parse(&line) {
                        Ok(Some(ConsoleCommand::Quit)) => break,
                        Ok(Some(cmd)) => self.handle(cmd, poller, &events_tx),
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    }
                }
                Ok(()) = sessions.changed() => {
                    let view = sessions.borrow_and_update().clone();
                    render_view(&view, &poller.status());
                }
                Ok(()) = notices.changed() => {
                    if let Some(notice) = notices.borrow_and_update().clone() {
                        render_notice(&notice);
                    }
                }
                Some(event) = events_rx.recv() => match event {
                    ConsoleEvent::Started { market_id } => self.draft.discard_values_for(&market_id),
                },
            }
        }
        Ok(())
    }

    fn handle(
        &mut self,
        cmd: ConsoleCommand,
        poller: &PollerHandle,
        events: &mpsc::UnboundedSender<ConsoleEvent>,
    ) {
        match cmd {
            ConsoleCommand::List => render_view(&self.store.view(), &poller.status()),
            ConsoleCommand::Select(market_id) => {
                self.draft.select(market_id.clone());
                match self.store.view().config_of(market_id.as_str()) {
                    Some(cfg) => println!(
                        "Selected {} (running: size {}, up {}, down {})",
                        market_id, cfg.size, cfg.up_threshold, cfg.down_threshold
                    ),
                    None => println!("Selected {}", market_id),
                }
            }
            ConsoleCommand::Set { field, value } => {
                if self.draft.selected().is_none() {
                    println!("Select a market first");
                    return;
                }
                self.draft.set(field, value);
                render_draft(&self.draft);
            }
            ConsoleCommand::Start(None) => {
                let draft = self.draft.clone();
                self.spawn_start(draft, events);
            }
            ConsoleCommand::Start(Some(args)) => {
                let mut draft = DraftConfig::new();
                draft.select(args.market_id);
                draft.set(DraftField::Size, args.size);
                draft.set(DraftField::UpThreshold, args.up);
                draft.set(DraftField::DownThreshold, args.down);
                self.spawn_start(draft, events);
            }
            ConsoleCommand::Stop(market_id) => {
                let executor = self.executor.clone();
                tokio::spawn(async move {
                    // Failures surface through the notice board
                    if let Err(e) = executor.stop(&market_id).await {
                        debug!("Stop for {} did not complete: {}", market_id, e);
                    }
                });
            }
            ConsoleCommand::Dismiss => self.notices.dismiss(),
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Quit => {}
        }
    }

    fn spawn_start(&self, mut draft: DraftConfig, events: &mpsc::UnboundedSender<ConsoleEvent>) {
        let executor = self.executor.clone();
        let events = events.clone();
        tokio::spawn(async move {
            match executor.start_from_draft(&mut draft).await {
                Ok(_) => {
                    if let Some(market_id) = draft.selected().cloned() {
                        let _ = events.send(ConsoleEvent::Started { market_id });
                    }
                }
                Err(e) => debug!("Start did not complete: {}", e),
            }
        });
    }
}

fn render_view(view: &SessionView, status: &PollStatus) {
    let refreshing = if status.is_refreshing() {
        " (refreshing…)"
    } else {
        ""
    };
    println!("Active bots: {}{}", view.active_count(), refreshing);

    for bot in view.bots() {
        let market = bot.market_id.to_string();
        let state = bot.state.to_string();
        match bot.config {
            Some(cfg) => println!(
                "  {:<14} {:<9} size {} up {} down {}",
                market, state, cfg.size, cfg.up_threshold, cfg.down_threshold
            ),
            None => println!("  {:<14} {:<9} (config unknown)", market, state),
        }
    }

    if let Some(err) = &status.last_error {
        println!("  last poll failed: {}", err);
    }
}

fn render_notice(notice: &Notice) {
    match &notice.market_id {
        Some(market_id) => println!("! [{}] {}", market_id, notice.message),
        None => println!("! {}", notice.message),
    }
}

fn render_draft(draft: &DraftConfig) {
    let show = move |field: DraftField| draft.value(field).unwrap_or("-");
    println!(
        "Draft for {}: size {} up {} down {}",
        draft.selected().map(MarketId::as_str).unwrap_or("-"),
        show(DraftField::Size),
        show(DraftField::UpThreshold),
        show(DraftField::DownThreshold)
    );
}

fn print_help() {
    println!("Commands:");
    println!("  list                               show active bots");
    println!("  select <market>                    select a market to configure");
    println!("  set size|up|down <value>           edit the draft for the selected market");
    println!("  start [<market> <size> <up> <down>] start a bot");
    println!("  stop <market>                      stop a bot");
    println!("  dismiss                            clear the current notice");
    println!("  quit");
}
