// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

use core::fmt;
use gpio::{GpioIn, GpioOut, GpioValue};
use std::{
    error::Error,
    io, mem,
    sync::mpsc::{self, Receiver, SendError, Sender},
    thread,
    time::Duration,
};

/// Binary representation of a packet as it travels the bus, the value and its
/// length in bits.
pub type SerialData = (u64, u8);

/// Sends commands to devices on the bus from a background thread so that the
/// robot loop never blocks on the wire.
pub struct Client {
    tx: Sender<SerialData>,
}

impl Client {
    /// Creates a new `Client` given already opened `GpioOut` implementations
    /// for the bus clock and data lines.
    pub fn new<T>(clock: T, data: T, cycle: Duration) -> Self
    where
        T: GpioOut + Send + 'static,
        <T as GpioOut>::Error: Send,
    {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || -> Result<(), T::Error> {
            let mut sender = BitSender::new(clock, data, cycle);

            // A disconnected channel means the `Client` was dropped and this
            // thread should quietly end with it.
            while let Ok(packet) = rx.recv() {
                sender.send(packet)?;
            }

            Ok(())
        });

        Self { tx }
    }

    /// Queues a packet for transmission, returning its header on success. An
    /// `Ok` means the packet reached the sending thread, not that any device
    /// has acted on it yet. An `Err` means the sending thread has died, which
    /// only happens when the thread hit a GP I/O error.
    #[inline]
    pub fn send<H, D>(&mut self, packet: Packet<H, D>) -> Result<H, SendError<SerialData>>
    where
        H: Header,
        D: Data,
    {
        self.tx.send(packet.into())?;
        Ok(packet.head)
    }
}

/// Receives packets sent to the controller by devices on the bus. Devices only
/// transmit in response to a request, so everything received here is an answer
/// to something a `Client` sent.
pub struct Server {
    rx: Receiver<SerialData>,
    received: Vec<Packet<(u8, u8), u32>>,
}

impl Server {
    /// Creates a new `Server` given already opened `GpioIn` implementations
    /// for the bus clock and data lines.
    pub fn new<T>(clock: T, data: T) -> Self
    where
        T: GpioIn + Send + 'static,
        <T as GpioIn>::Error: Send,
    {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let mut receiver = BitReceiver::new(clock, data);

            loop {
                if let Some(data) = receiver.recv(Packet::<(u8, u8), u32>::BITS as u8) {
                    if tx.send(data).is_err() {
                        return;
                    }
                }
            }
        });

        Self {
            rx,
            received: Vec::new(),
        }
    }

    /// Gets the most recent packet whose header matches the given one, or
    /// `None` if no such packet has arrived. Only the latest packet per header
    /// is kept, a newer reading always replaces an older one.
    #[must_use]
    pub fn get<H>(&mut self, head: H) -> Option<Packet<(u8, u8), u32>>
    where
        H: Header,
    {
        while let Ok(data) = self.rx.try_recv() {
            let packet = Packet::<(u8, u8), u32>::parse(data);

            match self.received.iter_mut().find(|p| p.head == packet.head) {
                Some(p) => *p = packet,
                None => self.received.push(packet),
            }
        }

        self.received
            .iter()
            .find(|p| match H::extract(p) {
                Ok(h) => h.get() == head.get(),
                Err(_) => false,
            })
            .copied()
    }
}

/// Clocks bits out over a clock and data line pair.
///
/// The idle state is clock high, data low. A packet opens with both lines
/// high, after which each bit is presented on the data line while the clock is
/// low and held until the clock rises again. Devices must only sample the
/// data line while the clock is low.
struct BitSender<T: GpioOut> {
    clock: T,
    data: T,
    cycle: Duration,
}

impl<T: GpioOut> BitSender<T> {
    fn new(clock: T, data: T, cycle: Duration) -> Self {
        Self { clock, data, cycle }
    }

    /// Returns both lines to the idle state.
    fn idle(&mut self) -> Result<(), T::Error> {
        self.clock.set_high()?;
        self.data.set_low()?;
        Ok(())
    }

    /// Sends one packet's bits, most significant first, and returns the
    /// number of bits sent.
    fn send(&mut self, (bits, len): SerialData) -> Result<u8, T::Error> {
        self.idle()?;

        // Both lines high marks the start of a packet.
        self.clock.set_high()?;
        self.data.set_high()?;
        thread::sleep(self.cycle);

        for i in (0..len).rev() {
            let bit = bits >> i & 1 != 0;

            self.data.set_value(bit)?;
            self.clock.set_low()?;
            thread::sleep(self.cycle);

            self.clock.set_high()?;
            thread::sleep(self.cycle);
        }

        self.idle()?;
        Ok(len)
    }
}

/// Reads bits off a clock and data line pair, the receiving half of
/// [`BitSender`]'s wire protocol.
struct BitReceiver<T: GpioIn> {
    clock: T,
    data: T,
}

impl<T: GpioIn> BitReceiver<T> {
    fn new(clock: T, data: T) -> Self {
        Self { clock, data }
    }

    /// Blocks until a packet start is seen, then reads `size` bits and
    /// returns them. Returns `None` on a malformed start or a GP I/O error.
    fn recv(&mut self, size: u8) -> Option<SerialData> {
        // Wait out the idle state.
        while self.clock.read_value().ok()? == GpioValue::High
            && self.data.read_value().ok()? == GpioValue::Low
        {}

        // Anything other than the double-high start marker here is noise.
        if self.clock.read_value().ok()? != GpioValue::High
            || self.data.read_value().ok()? != GpioValue::High
        {
            return None;
        }

        let mut bits = 0u64;

        for _ in 0..size {
            bits <<= 1;

            // Bits are valid while the clock is low.
            while self.clock.read_value().ok()? == GpioValue::High {}

            if self.data.read_value().ok()? == GpioValue::High {
                bits |= 1u64;
            }

            // Wait for the clock to rise so the same bit is never read twice.
            while self.clock.read_value().ok()? == GpioValue::Low {}
        }

        Some((bits, size))
    }
}

/// A single addressed packet on the bus, `H` being the [`Header`]
/// implementation in use and `D` the [`Data`] implementation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Packet<H, D>
where
    H: Header,
    D: Data,
{
    pub head: H,
    pub data: D,
}

impl<H, D> Packet<H, D>
where
    H: Header,
    D: Data,
{
    /// Number of bits a packet occupies on the wire: one address byte, one
    /// command byte, and a 32 bit payload.
    pub const BITS: u32 = (mem::size_of::<u8>() * 2 * 8) as u32 + u32::BITS;

    /// Creates a new packet from a header and payload.
    #[inline]
    #[must_use]
    pub const fn new(head: H, data: D) -> Self {
        Self { head, data }
    }

    /// Gets the generic integer representation of the packet.
    #[inline]
    #[must_use]
    pub fn get(self) -> Packet<(u8, u8), u32> {
        Packet::new(self.head.get(), self.data.get())
    }

    /// Splits raw bus data into the generic integer packet representation.
    /// Use [`Packet::try_from`] to extract a specific header and payload
    /// implementation instead.
    #[must_use]
    pub fn parse((bits, _): SerialData) -> Packet<(u8, u8), u32> {
        let addr = (bits >> (u8::BITS + u32::BITS)) as u8;
        let cmd = (bits >> u32::BITS) as u8;

        Packet::new((addr, cmd), bits as u32)
    }
}

impl<H, D> TryFrom<SerialData> for Packet<H, D>
where
    H: Header,
    D: Data,
{
    type Error = ExtractionError;

    fn try_from(value: SerialData) -> ExtractionResult<Self> {
        let (_, size) = value;

        if size != Self::BITS as u8 {
            return Err(ExtractionError);
        }

        let packet = Self::parse(value);

        Ok(Self {
            head: H::extract(&packet)?,
            data: D::extract(&packet)?,
        })
    }
}

impl<H, D> From<Packet<H, D>> for SerialData
where
    H: Header,
    D: Data,
{
    fn from(packet: Packet<H, D>) -> Self {
        let (addr, cmd) = packet.head.get();
        let bits = ((addr as u64) << (u8::BITS + u32::BITS))
            | ((cmd as u64) << u32::BITS)
            | packet.data.get() as u64;

        (bits, Packet::<H, D>::BITS as u8)
    }
}

/// Result of extracting a [`Header`] or [`Data`] implementation from a
/// generic packet.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// The packet did not hold a valid value of the requested implementation.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionError;

impl Error for ExtractionError {}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "packet held no valid header or data of the requested kind")
    }
}

/// A packet tag holding the address of a device on the bus and a command
/// byte whose meaning is up to the device.
pub trait Header: Clone + Copy {
    /// Constructs an instance from the given packet, failing if the packet's
    /// tag is not valid for this implementation.
    fn extract<H, D>(packet: &Packet<H, D>) -> ExtractionResult<Self>
    where
        H: Header,
        D: Data;

    /// Gets the address and command bytes, in that order.
    #[must_use]
    fn get(&self) -> (u8, u8);
}

/// A packet payload. Whatever the implementer holds must fit in 32 bits on
/// the wire, even if the integer interpretation of those bits is nonsense.
pub trait Data: Clone + Copy {
    /// Constructs an instance from the given packet, failing if the packet's
    /// payload is not valid for this implementation.
    fn extract<H, D>(packet: &Packet<H, D>) -> ExtractionResult<Self>
    where
        H: Header,
        D: Data;

    /// Gets the payload's wire representation.
    #[must_use]
    fn get(&self) -> u32;
}

impl Header for (u8, u8) {
    fn extract<H, D>(packet: &Packet<H, D>) -> ExtractionResult<Self>
    where
        H: Header,
        D: Data,
    {
        Ok(packet.head.get())
    }

    fn get(&self) -> (u8, u8) {
        *self
    }
}

impl Data for u32 {
    fn extract<H, D>(packet: &Packet<H, D>) -> ExtractionResult<Self>
    where
        H: Header,
        D: Data,
    {
        Ok(packet.data.get())
    }

    fn get(&self) -> u32 {
        *self
    }
}

impl Data for i32 {
    fn extract<H, D>(packet: &Packet<H, D>) -> ExtractionResult<Self>
    where
        H: Header,
        D: Data,
    {
        Ok(packet.data.get() as i32)
    }

    fn get(&self) -> u32 {
        *self as u32
    }
}

impl Data for f32 {
    fn extract<H, D>(packet: &Packet<H, D>) -> ExtractionResult<Self>
    where
        H: Header,
        D: Data,
    {
        Ok(f32::from_bits(packet.data.get()))
    }

    fn get(&self) -> u32 {
        self.to_bits()
    }
}

/// In-memory `GpioIn` for testing the bus without hardware, fed by the
/// channel of a matching [`TestGpioOut`].
pub struct TestGpioIn {
    rx: Receiver<GpioValue>,
    state: GpioValue,
}

impl TestGpioIn {
    /// Creates a new test input pin reading values from `rx` and assuming
    /// `state` until something arrives.
    pub fn new(rx: Receiver<GpioValue>, state: GpioValue) -> Self {
        Self { rx, state }
    }
}

impl GpioIn for TestGpioIn {
    // Never actually returned by this implementation.
    type Error = io::Error;

    fn read_value(&mut self) -> Result<GpioValue, Self::Error> {
        self.state = self.rx.try_recv().unwrap_or(self.state);
        Ok(self.state)
    }
}

/// In-memory `GpioOut` for testing the bus without hardware, the writing half
/// of [`TestGpioIn`].
pub struct TestGpioOut {
    tx: Sender<GpioValue>,
}

impl TestGpioOut {
    /// Creates a new test output pin writing values into `tx`.
    pub fn new(tx: Sender<GpioValue>) -> Self {
        Self { tx }
    }
}

impl GpioOut for TestGpioOut {
    type Error = mpsc::SendError<GpioValue>;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.tx.send(GpioValue::Low)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.tx.send(GpioValue::High)
    }
}

#[cfg(test)]
mod tests {
    use super::{BitReceiver, BitSender, Client, Packet, Server, TestGpioIn, TestGpioOut};
    use gpio::GpioValue;
    use std::{f32, sync::mpsc, thread, time::Duration};

    #[test]
    fn packet_wire_form() {
        let packet = Packet::new((3u8, 7u8), 0xDEAD_BEEFu32);
        let data: super::SerialData = packet.into();

        assert_eq!(Packet::<(u8, u8), u32>::parse(data), packet);
        assert_eq!(
            Packet::<(u8, u8), u32>::try_from(data).unwrap(),
            packet
        );
    }

    #[test]
    fn signed_payload_round_trip() {
        let packet = Packet::new((2u8, 5u8), -1337i32);
        let data: super::SerialData = packet.into();
        let back = Packet::<(u8, u8), i32>::try_from(data).unwrap();

        assert_eq!(back.data, -1337i32);
    }

    #[test]
    fn send_and_recv() {
        let packets = [
            Packet::new((1u8, 255u8), 314u32),
            Packet::new((5u8, 255u8), f32::consts::PI.to_bits()),
        ];

        let (clock_tx, clock_rx) = mpsc::channel();
        let (data_tx, data_rx) = mpsc::channel();

        let expected = packets.clone();

        let handle = thread::spawn(move || -> Vec<Packet<(u8, u8), u32>> {
            let mut receiver = BitReceiver::new(
                TestGpioIn::new(clock_rx, GpioValue::High),
                TestGpioIn::new(data_rx, GpioValue::Low),
            );

            expected
                .iter()
                .map(|p| {
                    let data = receiver
                        .recv(Packet::<(u8, u8), u32>::BITS as u8)
                        .expect("receiver should see every sent packet");
                    Packet::<(u8, u8), u32>::try_from(data)
                        .expect("received data should parse as a packet")
                })
                .collect()
        });

        let mut sender = BitSender::new(
            TestGpioOut::new(clock_tx),
            TestGpioOut::new(data_tx),
            Duration::from_millis(2),
        );

        for p in packets {
            // The trailing idle set can fail once the receiving end hangs up,
            // which is of no consequence here.
            sender.send(p.into()).unwrap_or_default();
        }

        let received = handle.join().unwrap();

        for (sent, got) in packets.iter().zip(received) {
            assert_eq!(sent.get(), got);
        }
    }

    #[test]
    fn serv_and_client() {
        let packets = [
            Packet::new((1u8, 2u8), 42u32),
            Packet::new((4u8, 8u8), f32::consts::TAU.to_bits()),
        ];

        let (clock_tx, clock_rx) = mpsc::channel();
        let (data_tx, data_rx) = mpsc::channel();

        let mut server = Server::new(
            TestGpioIn::new(clock_rx, GpioValue::Low),
            TestGpioIn::new(data_rx, GpioValue::Low),
        );

        let mut client = Client::new(
            TestGpioOut::new(clock_tx),
            TestGpioOut::new(data_tx),
            Duration::from_millis(2),
        );

        for p in packets {
            client.send(p).unwrap();

            // Give the server thread time to clock the packet in.
            thread::sleep(Duration::from_millis(200));

            assert_eq!(p.get(), server.get(p.head).unwrap());
        }
    }

    #[test]
    fn latest_reading_wins() {
        let (clock_tx, clock_rx) = mpsc::channel();
        let (data_tx, data_rx) = mpsc::channel();

        let mut server = Server::new(
            TestGpioIn::new(clock_rx, GpioValue::Low),
            TestGpioIn::new(data_rx, GpioValue::Low),
        );

        let mut client = Client::new(
            TestGpioOut::new(clock_tx),
            TestGpioOut::new(data_tx),
            Duration::from_millis(2),
        );

        for value in [1u32, 2u32, 3u32] {
            client.send(Packet::new((9u8, 1u8), value)).unwrap();
            thread::sleep(Duration::from_millis(200));
        }

        assert_eq!(server.get((9u8, 1u8)).unwrap().data, 3u32);
    }
}
