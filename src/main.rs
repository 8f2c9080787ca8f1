use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use propcontroller::config::Config;
use propcontroller::link::sysfs::SysfsLink;
use propcontroller::mqtt::{Collaborators, Initializing, MqttManager, RumqttTransport, TopicRouter};
use propcontroller::platform::{MonotonicClock, TracingConsole};
use propcontroller::props::relay::{open_gpio, Relay};
use propcontroller::props::{PropCallbacks, PropRegistry, PropState, RoomHooks};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

type SharedStates = Rc<RefCell<Vec<PropState>>>;
type SharedRelay = Rc<RefCell<Relay>>;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = Config::load().await?;
    info!(
        "Starting prop controller {} with {} props",
        config.mqtt.client_id,
        config.props.len()
    );

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {}", e);
        }
        info!("Shutdown requested");
        shutdown.cancel();
    });

    // rumqttc's sync client drives its own runtime, keep it off the async workers
    tokio::task::spawn_blocking(move || run_device(config, token))
        .await
        .map_err(|e| eyre!("Device loop panicked: {}", e))??;

    info!("Prop controller stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn run_device(config: Config, token: CancellationToken) -> Result<()> {
    let initial = vec![PropState::NotActivated; config.props.len()];
    let states: SharedStates = Rc::new(RefCell::new(initial));
    let gpio = open_gpio();

    let mut props = Vec::with_capacity(config.props.len());
    let mut relays = Vec::new();
    for (index, prop_config) in config.props.iter().enumerate() {
        let relay: Option<SharedRelay> = prop_config
            .relay_pin
            .map(|pin| Rc::new(RefCell::new(Relay::open(gpio.as_ref(), pin))));
        relays.extend(relay.clone());
        props.push(
            prop_config
                .to_prop()
                .with_callbacks(prop_callbacks(index, &states, relay)),
        );
    }
    let registry = PropRegistry::new(props)
        .map_err(|e| eyre!("Invalid prop configuration: {}", e))?;

    let room_states = states.clone();
    let room = RoomHooks::new()
        .on_start(|| info!("Room started"))
        .on_reset(move || {
            info!("Room reset, all props back to {}", PropState::NotActivated);
            room_states.borrow_mut().fill(PropState::NotActivated);
            for relay in &relays {
                relay.borrow_mut().set(false);
            }
        });

    let router = TopicRouter::new(registry, room)
        .with_extra_topics(config.mqtt.extra_topics.clone())
        .with_fallback(|topic, payload| {
            warn!(
                "Unhandled message on {}: {}",
                topic,
                String::from_utf8_lossy(payload)
            )
        });

    let link = SysfsLink::new(config.link.interface.clone())
        .with_root(config.link.sysfs_root.clone())
        .with_reinit_command(config.link.reinit_command.clone());
    let io = Collaborators {
        transport: Box::new(RumqttTransport::new(config.mqtt.clone())),
        link: Box::new(link),
        console: Box::new(TracingConsole),
        clock: Box::new(MonotonicClock::new()),
    };

    let manager = MqttManager::<Initializing>::create(config.manager_settings(), router, io);
    let mut manager = manager.initialize();

    let tick = Duration::from_millis(config.manager.tick_interval_ms);
    while !token.is_cancelled() {
        let snapshot = states.borrow().clone();
        let report = manager.routine(&snapshot);
        if let Ok(Some(broadcast)) = report.broadcast {
            debug!("Heartbeat: {:?}", broadcast);
        }
        std::thread::sleep(tick);
    }

    Ok(())
}

/// Wires one prop's commands to its state slot and optional relay.
fn prop_callbacks(
    index: usize,
    states: &SharedStates,
    relay: Option<SharedRelay>,
) -> PropCallbacks {
    PropCallbacks::new()
        .on_activate(enter(index, states, relay.clone(), PropState::Activated))
        .on_finish(enter(index, states, relay.clone(), PropState::Finished))
        .on_reset(enter(index, states, relay, PropState::NotActivated))
}

/// Moves one prop to `next`. Only an activated prop keeps its relay energized.
fn enter(
    index: usize,
    states: &SharedStates,
    relay: Option<SharedRelay>,
    next: PropState,
) -> impl FnMut() + 'static {
    let states = states.clone();
    move || {
        if let Some(slot) = states.borrow_mut().get_mut(index) {
            *slot = next;
        }
        if let Some(relay) = &relay {
            relay.borrow_mut().set(next == PropState::Activated);
        }
    }
}
