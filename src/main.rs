use std::env;
use std::process;

use crossbeam_channel::unbounded;

use etherchess::session::Session;
use etherchess::{iface, workers, Identity};

fn main() {
    let args: Vec<String> = env::args().collect();
    let verbose = args.iter().any(|arg| arg == "-v");
    let chosen_iface = args
        .iter()
        .find_map(|arg| arg.strip_prefix("--interface=").map(str::to_owned));

    env_logger::Builder::new()
        .filter(
            None,
            if verbose {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .init();

    let iface = match iface::find(chosen_iface.as_deref()) {
        Ok(iface) => iface,
        Err(err) => {
            log::error!("error finding a network interface: {err}");
            process::exit(1);
        }
    };
    log::info!("using interface {} ({})", iface.name, iface.mac);

    let identity = Identity::generate(iface.mac);

    let (send_tx, send_rx) = unbounded();
    let (recv_tx, recv_rx) = unbounded();
    let (input_tx, input_rx) = unbounded();
    let (tick_tx, tick_rx) = unbounded();

    // The workers run as daemons; they die with the process once the
    // session returns
    let _sender = workers::spawn_sender(iface.clone(), send_rx);
    let _receiver = workers::spawn_receiver(iface, recv_tx);
    let _input = workers::spawn_input(input_tx);
    let _ticker = workers::spawn_ticker(tick_tx);

    Session::new(identity, send_tx).run(input_rx, recv_rx, tick_rx);
}
