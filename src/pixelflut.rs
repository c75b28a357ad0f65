use monoio::{
    io::{AsyncReadRent, AsyncWriteRentExt},
    net::TcpStream,
};
use repaint_core::{Board, Color, Credential, Error};
use std::{
    cell::RefCell,
    collections::HashMap,
    io,
    net::SocketAddr,
    str,
};

/// Amount of `PX x y` reads in flight per round trip.
const READ_CHUNK: usize = 1024;

macro_rules! attempt {
    ($io:expr) => {{
        let (result, buf) = { $io };
        result?;
        buf
    }};
}

#[inline]
fn encode_dec(buf: &mut itoa::Buffer, num: impl itoa::Integer) -> &str {
    buf.format(num)
}

pub async fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Rectangle of the canvas the board keeps a snapshot of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Smallest region covering both `self` and `other`.
    pub fn union(self, other: Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);

        Region {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        let (dx, dy) = (x.checked_sub(self.x)?, y.checked_sub(self.y)?);
        (dx < self.width && dy < self.height)
            .then(|| dx as usize * self.height as usize + dy as usize)
    }

    fn cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.x..self.x + self.width)
            .flat_map(move |x| (self.y..self.y + self.height).map(move |y| (x, y)))
    }
}

/// Lowercase `rrggbb` of a color.
#[inline]
fn encode_hex(color: Color) -> [u8; 6] {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";

    let mut out = [0; 6];
    for (i, digit) in out.iter_mut().enumerate() {
        let shift = 20 - 4 * i;
        *digit = DIGITS[((color.0 >> shift) & 0xf) as usize];
    }
    out
}

/// Pixelflut server as a board.
///
/// Pixelflut has no notion of accounts, so each credential uid simply gets its own
/// connection and the secret is unused.
///
/// Only cells inside `region` are ever observed. Everything placed outside of it reads
/// as unknown and is therefore always considered wrong, so the region has to cover
/// every placement the board is used with.
pub struct PixelflutBoard {
    addr: SocketAddr,
    region: Region,
    snapshot: RefCell<Option<Vec<Color>>>,
    conns: RefCell<HashMap<u64, (TcpStream, Vec<u8>)>>,
}

impl PixelflutBoard {
    pub fn new(addr: SocketAddr, region: Region) -> Self {
        Self {
            addr,
            region,
            snapshot: RefCell::new(None),
            conns: RefCell::new(HashMap::new()),
        }
    }

    async fn fetch(&self) -> io::Result<Vec<Color>> {
        let mut conn = connect(self.addr).await?;
        let mut snapshot = vec![Color::default(); self.region.width as usize * self.region.height as usize];

        let cells: Vec<(u32, u32)> = self.region.cells().collect();
        let mut num_buf = itoa::Buffer::new();
        let mut request = Vec::with_capacity(READ_CHUNK * 16);
        let mut read_buf = Vec::with_capacity(64 * 1024);
        let mut line_buf = Vec::new();

        for chunk in cells.chunks(READ_CHUNK) {
            request.clear();
            for (x, y) in chunk {
                request.extend_from_slice(b"PX ");
                request.extend_from_slice(encode_dec(&mut num_buf, *x).as_bytes());
                request.push(b' ');
                request.extend_from_slice(encode_dec(&mut num_buf, *y).as_bytes());
                request.push(b'\n');
            }
            request = attempt!(conn.write_all(request).await);

            let mut answered = 0;
            while answered < chunk.len() {
                let (result, buf) = conn.read(read_buf).await;
                read_buf = buf;
                let read = result?;
                if read == 0 {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }

                line_buf.extend_from_slice(&read_buf[..read]);
                while let Some(end) = line_buf.iter().position(|byte| *byte == b'\n') {
                    let line: Vec<u8> = line_buf.drain(..=end).collect();
                    let (x, y, color) = parse_pixel(&line)?;
                    if let Some(idx) = self.region.index(x, y) {
                        snapshot[idx] = color;
                    }
                    answered += 1;
                }
            }
        }

        Ok(snapshot)
    }
}

/// Parse a `PX <x> <y> <rrggbb[aa]>` answer.
fn parse_pixel(line: &[u8]) -> io::Result<(u32, u32, Color)> {
    let invalid = || io::Error::new(io::ErrorKind::InvalidData, "malformed pixel answer");

    let line = str::from_utf8(line).map_err(|_| invalid())?;
    let mut parts = line.split_ascii_whitespace();
    if parts.next() != Some("PX") {
        return Err(invalid());
    }

    let x = parts.next().and_then(|x| x.parse().ok()).ok_or_else(invalid)?;
    let y = parts.next().and_then(|y| y.parse().ok()).ok_or_else(invalid)?;
    let hex = parts.next().and_then(|hex| hex.get(..6)).ok_or_else(invalid)?;
    let rgb = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;

    Ok((x, y, Color(rgb)))
}

impl Board for PixelflutBoard {
    fn observed_color(&self, x: u32, y: u32) -> Option<Color> {
        let idx = self.region.index(x, y)?;
        self.snapshot.borrow().as_ref().map(|snapshot| snapshot[idx])
    }

    async fn refresh(&self, force: bool) -> Result<(), Error> {
        debug!(force, "fetching board region");
        let snapshot = self.fetch().await.map_err(Error::RefreshFailed)?;
        *self.snapshot.borrow_mut() = Some(snapshot);
        Ok(())
    }

    async fn write_pixel(&self, x: u32, y: u32, color: Color, credential: &Credential) -> bool {
        let conn = self.conns.borrow_mut().remove(&credential.uid);
        let (mut conn, mut command) = match conn {
            Some(conn) => conn,
            None => match connect(self.addr).await {
                Ok(conn) => (conn, Vec::with_capacity(32)),
                Err(error) => {
                    error!(?error, uid = credential.uid, "connecting failed :((");
                    return false;
                }
            },
        };

        let mut num_buf = itoa::Buffer::new();
        command.clear();
        command.extend_from_slice(b"PX ");
        command.extend_from_slice(encode_dec(&mut num_buf, x).as_bytes());
        command.push(b' ');
        command.extend_from_slice(encode_dec(&mut num_buf, y).as_bytes());
        command.push(b' ');
        command.extend_from_slice(&encode_hex(color));
        command.push(b'\n');

        let (result, command) = conn.write_all(command).await;
        match result {
            Ok(_) => {
                self.conns.borrow_mut().insert(credential.uid, (conn, command));
                true
            }
            Err(error) => {
                error!(?error, uid = credential.uid, "sending failed :((");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Region, encode_hex, parse_pixel};
    use repaint_core::Color;

    #[test]
    fn parses_answers_with_and_without_alpha() {
        assert_eq!(
            parse_pixel(b"PX 12 7 a0b1c2\n").unwrap(),
            (12, 7, Color(0xa0b1c2))
        );
        assert_eq!(
            parse_pixel(b"PX 0 0 ffffffff\n").unwrap(),
            (0, 0, Color(0xffffff))
        );
        assert!(parse_pixel(b"SIZE 800 600\n").is_err());
        assert!(parse_pixel(b"PX 1 2 zz\n").is_err());
    }

    #[test]
    fn region_maps_canvas_coordinates() {
        let region = Region {
            x: 10,
            y: 20,
            width: 3,
            height: 2,
        };

        assert_eq!(region.index(10, 20), Some(0));
        assert_eq!(region.index(11, 21), Some(3));
        assert_eq!(region.index(9, 20), None);
        assert_eq!(region.index(13, 20), None);
        assert_eq!(region.cells().count(), 6);
    }

    #[test]
    fn union_covers_both_regions() {
        let a = Region {
            x: 10,
            y: 20,
            width: 5,
            height: 5,
        };
        let b = Region {
            x: 0,
            y: 22,
            width: 3,
            height: 10,
        };

        let both = a.union(b);
        assert_eq!(
            both,
            Region {
                x: 0,
                y: 20,
                width: 15,
                height: 12,
            }
        );
        assert!(both.index(12, 24).is_some());
        assert!(both.index(1, 31).is_some());
        assert_eq!(a.union(a), a);
    }

    #[test]
    fn hex_matches_color_display() {
        for color in [Color(0), Color(0x0a0b0c), Color(0xa0b1c2), Color::WHITE] {
            assert_eq!(encode_hex(color).as_slice(), color.to_string().as_bytes());
        }
    }
}
