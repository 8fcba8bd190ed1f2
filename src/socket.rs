use std::io;
use std::mem::{self, MaybeUninit};

use socket2::{Domain, Protocol, Socket, Type};

use crate::iface::Interface;

#[derive(thiserror::Error, Debug)]
#[error("failed to create and bind packet socket: {0}")]
pub struct Error(#[from] std::io::Error);

pub type Result<T> = std::result::Result<T, Error>;

/// A raw `AF_PACKET` socket bound to one interface.
///
/// Frames pass through verbatim, layer-2 header included; the kernel does
/// no addressing on our behalf. Opening one requires `CAP_NET_RAW`.
pub struct PacketSocket(Socket);

impl PacketSocket {
    pub fn bind(iface: &Interface) -> Result<Self> {
        // ETH_P_ALL in network byte order, both for the socket protocol and
        // the bind address
        let protocol = (libc::ETH_P_ALL as u16).to_be();
        let socket = Socket::new(
            Domain::PACKET,
            Type::RAW,
            Some(Protocol::from(protocol as i32)),
        )?;

        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let sll = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_ll;
        unsafe {
            (*sll).sll_family = libc::AF_PACKET as libc::sa_family_t;
            (*sll).sll_protocol = protocol;
            (*sll).sll_ifindex = iface.index;
        }
        let addr = unsafe {
            socket2::SockAddr::new(storage, mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t)
        };
        socket.bind(&addr)?;

        Ok(PacketSocket(socket))
    }

    pub fn send(&self, frame: &[u8]) -> io::Result<usize> {
        self.0.send(frame)
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // Safety: MaybeUninit<u8> has the same layout as u8, and the buffer
        // is already initialized
        let uninit =
            unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        self.0.recv(uninit)
    }
}
