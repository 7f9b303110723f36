use crate::base::error::{Error, Result};
use crate::protocol;
use log::{trace, warn};
use std::io;

const READ_CHUNK_SIZE: usize = 1024;

/// Channel frames commands and reads framed replies over a byte stream.
///
/// The CoLa A session is strictly synchronous: one command is written, one
/// reply is read back, nothing is pipelined. The stream type is generic so the
/// same channel runs over a `TcpStream` in production and an in-memory mock in
/// tests.
///
/// # Examples
/// ```ignore
/// let mut channel = Channel::new(Box::new(tcp_stream));
/// let reply = channel.invoke("sRN LMPscancfg", 128)?;
/// ```
#[derive(Debug)]
pub struct Channel<T: ?Sized> {
    stream: Box<T>,
}

impl<T: ?Sized> Channel<T>
where
    T: io::Read + io::Write,
{
    /// Create a new `Channel` over an open stream.
    pub fn new(stream: Box<T>) -> Channel<T> {
        trace!("Creating new Channel");
        Channel { stream }
    }

    /// Frame `command` in STX/ETX and write it to the stream.
    pub fn send(&mut self, command: &str) -> Result<()> {
        trace!("Sending command: {:?}", command);
        let framed = protocol::frame(command);
        self.stream.write_all(&framed)?;
        self.stream.flush()?;
        trace!("Wrote {} bytes", framed.len());
        Ok(())
    }

    /// Read one reply telegram, up to `max_len` bytes.
    ///
    /// Reads until the ETX terminator arrives or `max_len` bytes have been
    /// consumed, whichever comes first; the per-read timeout of the underlying
    /// stream bounds how long this blocks. Returns the reply with the frame
    /// bytes stripped.
    pub fn receive(&mut self, max_len: usize) -> Result<String> {
        let mut raw: Vec<u8> = Vec::with_capacity(max_len.min(READ_CHUNK_SIZE));
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            let want = (max_len - raw.len()).min(READ_CHUNK_SIZE);
            let n = self.stream.read(&mut chunk[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed while reading telegram",
                )
                .into());
            }
            trace!("Read {} bytes from stream ({} total)", n, raw.len() + n);
            raw.extend_from_slice(&chunk[..n]);

            if chunk[..n].contains(&protocol::ETX) {
                break;
            }
            if raw.len() >= max_len {
                warn!(
                    "Reply buffer filled ({} bytes) before ETX terminator",
                    max_len
                );
                break;
            }
        }

        let text = String::from_utf8(raw).map_err(|_| Error::MalformedTelegram {
            description: "reply is not valid ASCII".to_owned(),
        })?;
        Ok(protocol::unframe(&text))
    }

    /// Write a command and read its reply.
    ///
    /// # Example
    /// ```ignore
    /// let reply = channel.invoke("sMN Run", 128)?;
    /// ```
    pub fn invoke(&mut self, command: &str, max_reply_len: usize) -> Result<String> {
        self.send(command)?;
        let reply = self.receive(max_reply_len)?;
        trace!("Received reply: {:?}", reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{Read, Write};

    /// Scripted stream: hands out canned read chunks, records written bytes.
    struct MockStream {
        reads: VecDeque<Vec<u8>>,
        written: Vec<u8>,
    }

    impl MockStream {
        fn new(reads: Vec<&[u8]>) -> MockStream {
            MockStream {
                reads: reads.into_iter().map(|c| c.to_vec()).collect(),
                written: Vec::new(),
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.reads.push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                }
                None => Ok(0),
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn send_frames_the_command() {
        let mut channel = Channel::new(Box::new(MockStream::new(vec![])));
        channel.send("sMN Run").unwrap();
        assert_eq!(channel.stream.written, b"\x02sMN Run\x03");
    }

    #[test]
    fn receive_joins_split_reply() {
        let mut channel = Channel::new(Box::new(MockStream::new(vec![
            &b"\x02sAN SetAcc"[..],
            &b"essMode 1\x03"[..],
        ])));
        let reply = channel.receive(128).unwrap();
        assert_eq!(reply, "sAN SetAccessMode 1");
    }

    #[test]
    fn receive_on_closed_stream_is_an_error() {
        let mut channel = Channel::new(Box::new(MockStream::new(vec![])));
        let err = channel.receive(128).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn invoke_round_trip() {
        let mut channel =
            Channel::new(Box::new(MockStream::new(vec![&b"\x02sWA LMDscandatacfg\x03"[..]])));
        let reply = channel
            .invoke("sWN LMDscandatacfg 01 00 2 1 0 01 00 0 0 0 0 +1", 128)
            .unwrap();
        assert_eq!(reply, "sWA LMDscandatacfg");
        assert!(channel.stream.written.starts_with(b"\x02sWN LMDscandatacfg"));
    }
}
