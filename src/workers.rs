//! The long-lived worker threads surrounding the session loop.
//!
//! Each worker owns its blocking resource (socket, stdin, clock) and talks
//! to the session over an unbounded channel. There is no cooperative
//! shutdown: the workers die with the process once the session returns.

use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::consts::{MAX_FRAME_SIZE, TICK_INTERVAL};
use crate::iface::Interface;
use crate::socket::PacketSocket;

/// Drains fully-serialized frames from the send channel onto the wire.
pub fn spawn_sender(iface: Interface, frames: Receiver<Vec<u8>>) -> JoinHandle<()> {
    thread::spawn(move || {
        let socket = match PacketSocket::bind(&iface) {
            Ok(socket) => socket,
            Err(err) => {
                log::error!("error opening the send socket, will not send frames: {err}");
                return;
            }
        };

        for frame in frames {
            log::debug!("sending {} bytes", frame.len());
            if let Err(err) = socket.send(&frame) {
                log::error!("error sending frame: {err}");
            }
        }
    })
}

/// Blocks on the raw socket and forwards every received frame.
pub fn spawn_receiver(iface: Interface, frames: Sender<Vec<u8>>) -> JoinHandle<()> {
    thread::spawn(move || {
        let socket = match PacketSocket::bind(&iface) {
            Ok(socket) => socket,
            Err(err) => {
                log::error!("error opening the receive socket, will not receive frames: {err}");
                return;
            }
        };
        log::info!("listening on interface {}", iface.name);

        let mut buf = [0u8; MAX_FRAME_SIZE];
        loop {
            match socket.recv(&mut buf) {
                Ok(len) => {
                    if frames.send(buf[..len].to_vec()).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    log::error!("error reading frames, exiting: {err}");
                    return;
                }
            }
        }
    })
}

/// Forwards stdin line by line; the channel disconnecting on EOF is how the
/// session learns it should exit.
pub fn spawn_input(lines: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if lines.send(line).is_err() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    })
}

/// Wakes the session ~20 times a second to drive connection maintenance.
pub fn spawn_ticker(ticks: Sender<()>) -> JoinHandle<()> {
    thread::spawn(move || loop {
        thread::sleep(TICK_INTERVAL);
        if ticks.send(()).is_err() {
            return;
        }
    })
}
