//! Network interface discovery.
//!
//! The kernel is queried through `getifaddrs`, which hands back one entry
//! per (interface, address family) pair: the `AF_PACKET` entry carries the
//! interface index and hardware address, the `AF_INET` entries its IPv4
//! addresses.

use std::ffi::CStr;
use std::io;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use crate::frame::MacAddr;

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub index: i32,
    pub mac: MacAddr,
    pub addrs: Vec<IpAddr>,
}

/// Picks the interface to bind to: the named one if the user chose one,
/// otherwise the interface holding the address the machine's hostname
/// resolves to.
pub fn find(chosen: Option<&str>) -> io::Result<Interface> {
    let interfaces = enumerate()?;

    if let Some(name) = chosen {
        if let Some(iface) = interfaces.iter().find(|i| i.name == name) {
            return Ok(iface.clone());
        }
        log::info!("the chosen interface does not exist, attaching to the default interface");
    }

    default_interface(interfaces)
}

fn default_interface(interfaces: Vec<Interface>) -> io::Result<Interface> {
    let host_ip = hostname_ip()?;
    interfaces
        .into_iter()
        .find(|iface| iface.addrs.contains(&host_ip))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "could not find the default network interface",
            )
        })
}

fn hostname_ip() -> io::Result<IpAddr> {
    let hostname = hostname()?;
    // Port zero: we only want the resolver, not a connection
    let mut addrs = (hostname.as_str(), 0u16).to_socket_addrs()?;
    addrs.next().map(|addr| addr.ip()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "could not find an IP for this machine's hostname",
        )
    })
}

fn hostname() -> io::Result<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

fn enumerate() -> io::Result<Vec<Interface>> {
    let mut ifap: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut ifap) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut interfaces: Vec<Interface> = Vec::new();
    let mut cursor = ifap;
    while !cursor.is_null() {
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_addr.is_null() {
            continue;
        }
        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();
        let iface = match interfaces.iter().position(|i| i.name == name) {
            Some(pos) => &mut interfaces[pos],
            None => {
                interfaces.push(Interface {
                    name,
                    index: 0,
                    mac: MacAddr([0; 6]),
                    addrs: Vec::new(),
                });
                interfaces.last_mut().unwrap()
            }
        };

        match unsafe { (*entry.ifa_addr).sa_family } as i32 {
            libc::AF_PACKET => {
                let sll = entry.ifa_addr as *const libc::sockaddr_ll;
                let (index, addr) = unsafe { ((*sll).sll_ifindex, (*sll).sll_addr) };
                iface.index = index;
                iface.mac = MacAddr([addr[0], addr[1], addr[2], addr[3], addr[4], addr[5]]);
            }
            libc::AF_INET => {
                let sin = entry.ifa_addr as *const libc::sockaddr_in;
                let raw = unsafe { (*sin).sin_addr.s_addr };
                iface
                    .addrs
                    .push(IpAddr::V4(Ipv4Addr::from(u32::from_be(raw))));
            }
            _ => {}
        }
    }

    unsafe { libc::freeifaddrs(ifap) };
    Ok(interfaces)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_finds_loopback() {
        let interfaces = enumerate().unwrap();
        let lo = interfaces.iter().find(|i| i.name == "lo");
        let lo = lo.expect("every linux machine has a loopback interface");
        assert!(lo.index > 0);
        assert!(lo.addrs.contains(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn unknown_name_falls_back_to_the_default() {
        // Either outcome is environment-dependent, but it must not panic
        let _ = find(Some("definitely-not-an-interface"));
    }
}
