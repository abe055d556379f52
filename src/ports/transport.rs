use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::rc::Rc;

/// Datagram endpoint: bind, send, receive. The engine performs exactly one
/// `recv` per `process_receive` call and drains its whole outbound queue per
/// `process_send`; whether `recv` blocks is entirely the host's choice.
pub trait Transport {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Production transport backed by a non-blocking `std::net::UdpSocket`.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }
}

impl Transport for UdpTransport {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }

    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

type Mailboxes = Rc<RefCell<HashMap<SocketAddr, VecDeque<(Vec<u8>, SocketAddr)>>>>;

/// In-process datagram hub shared by every `ChannelTransport` bound against
/// it. Lets a single test process run several `GossipEngine`s that talk to
/// each other without a real socket.
#[derive(Clone, Default)]
pub struct ChannelNetwork {
    mailboxes: Mailboxes,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self, addr: SocketAddr) -> ChannelTransport {
        self.mailboxes.borrow_mut().entry(addr).or_default();
        ChannelTransport {
            addr,
            mailboxes: self.mailboxes.clone(),
        }
    }
}

/// Test double exchanging datagrams between engines in the same process.
pub struct ChannelTransport {
    addr: SocketAddr,
    mailboxes: Mailboxes,
}

impl Transport for ChannelTransport {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut mailboxes = self.mailboxes.borrow_mut();
        let inbox = mailboxes.entry(self.addr).or_default();
        match inbox.pop_front() {
            Some((data, from)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok((n, from))
            }
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no datagram queued")),
        }
    }

    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let mut mailboxes = self.mailboxes.borrow_mut();
        mailboxes
            .entry(addr)
            .or_default()
            .push_back((buf.to_vec(), self.addr));
        Ok(buf.len())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_transport_delivers_between_peers() {
        let net = ChannelNetwork::new();
        let a_addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let b_addr: SocketAddr = "127.0.0.1:9002".parse().unwrap();
        let a = net.transport(a_addr);
        let mut b = net.transport(b_addr);

        a.send_to(b"hello", b_addr).unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = b.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(from, a_addr);
    }

    #[test]
    fn channel_transport_recv_would_block_when_empty() {
        let net = ChannelNetwork::new();
        let addr: SocketAddr = "127.0.0.1:9003".parse().unwrap();
        let mut t = net.transport(addr);
        let mut buf = [0u8; 16];
        let err = t.recv(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
