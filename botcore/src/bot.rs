// omnibot Copyright (c) 2016 the Omnibot robotics team.
// Licensed under the MIT License.
// See LICENSE file in repository root for complete license text.

use crate::serial;
use gpio::sysfs::{SysFsGpioInput, SysFsGpioOutput};
use std::{
    error::Error,
    fmt::Display,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time,
};

/// Manages the running of a [`Bot`] implementation: owns the bus client and
/// server, the gamepad handle, the stop flag, and the bot's current state.
pub struct BotRunner<T>
where
    T: Bot,
{
    state: State,
    gilrs: gilrs::Gilrs,
    stop: Arc<AtomicBool>,
    serial_tx: serial::Client,
    serial_rx: serial::Server,
    bot: T,
}

impl<T> BotRunner<T>
where
    T: Bot,
{
    /// Creates a new `BotRunner` for the given [`Bot`] implementation,
    /// opening its bus pins and running its init. The returned runner is in
    /// `State::Disabled` holding the time init finished.
    pub fn new(bot: T) -> io::Result<Self> {
        let serial_tx = serial::Client::new(
            SysFsGpioOutput::open(T::TX_CLOCK)?,
            SysFsGpioOutput::open(T::TX_DATA)?,
            T::SERIAL_CYCLE,
        );
        let serial_rx = serial::Server::new(
            SysFsGpioInput::open(T::RX_CLOCK)?,
            SysFsGpioInput::open(T::RX_DATA)?,
        );

        Self::with_bus(bot, serial_tx, serial_rx)
    }

    /// Like [`BotRunner::new`] but over an already opened bus, which also
    /// lets tests run a bot over in-memory pins.
    pub fn with_bus(
        mut bot: T,
        mut serial_tx: serial::Client,
        mut serial_rx: serial::Server,
    ) -> io::Result<Self> {
        bot.init(&mut serial_tx, &mut serial_rx)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        Ok(Self {
            state: State::Disabled(Some(time::Instant::now())),
            gilrs: gilrs::Gilrs::new().unwrap(),
            stop: Arc::new(AtomicBool::new(false)),
            serial_tx,
            serial_rx,
            bot,
        })
    }

    /// Starts a loop calling [`BotRunner::run`].
    #[inline]
    pub fn start(&mut self) {
        loop {
            self.run();
        }
    }

    /// Runs the [`Bot`] once, should be called in a loop. Which of the bot's
    /// functions runs depends on its [`State`]; an `Err` from any of them
    /// moves the bot to `State::Emergency` holding the time of the error.
    pub fn run(&mut self) {
        let base_state = match self.state {
            State::Emergency(t) => {
                let entered = t.unwrap_or_else(time::Instant::now);

                // An error out of the emergency handler leaves the bot right
                // where it is, there is no worse state to fall back to.
                self.state = self
                    .bot
                    .run_emergency(entered)
                    .unwrap_or(State::Emergency(Some(entered)));
                return;
            }
            _ => self
                .bot
                .run_base(self.state, &mut self.serial_tx, &mut self.serial_rx)
                .unwrap_or(State::Emergency(Some(time::Instant::now()))),
        };

        self.state = match base_state {
            State::Auto(t) => self.bot.run_auto(
                t.unwrap_or_else(time::Instant::now),
                self.stop.as_ref(),
                &mut self.serial_tx,
                &mut self.serial_rx,
            ),
            State::TeleOp(t) => self.bot.run_teleop(
                t.unwrap_or_else(time::Instant::now),
                &mut self.gilrs,
                &mut self.serial_tx,
                &mut self.serial_rx,
            ),
            State::Disabled(t) => self.bot.run_disabled(
                t.unwrap_or_else(time::Instant::now),
                &mut self.serial_tx,
                &mut self.serial_rx,
            ),
            State::Emergency(t) => self.bot.run_emergency(t.unwrap_or_else(time::Instant::now)),
        }
        .unwrap_or(State::Emergency(Some(time::Instant::now())));
    }

    /// Sets the bot's state to the given, populating a `None` time with now.
    pub fn set_state(&mut self, state: State) {
        let now_if_none = |t: Option<time::Instant>| Some(t.unwrap_or_else(time::Instant::now));

        self.state = match state {
            State::Auto(t) => State::Auto(now_if_none(t)),
            State::TeleOp(t) => State::TeleOp(now_if_none(t)),
            State::Disabled(t) => State::Disabled(now_if_none(t)),
            State::Emergency(t) => State::Emergency(now_if_none(t)),
        }
    }

    /// Gets the bot's current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Gets a handle to the stop flag. Raising it asks a running autonomous
    /// routine to end at its next step boundary.
    #[inline]
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }
}

/// Holds the custom code for running a robot. All default implementations
/// simply keep the current state.
pub trait Bot {
    /// Clock pin for transmitting on the bus.
    const TX_CLOCK: u16;

    /// Data pin for transmitting on the bus.
    const TX_DATA: u16;

    /// Clock pin for receiving on the bus.
    const RX_CLOCK: u16;

    /// Data pin for receiving on the bus.
    const RX_DATA: u16;

    /// Time between bits on the bus.
    const SERIAL_CYCLE: time::Duration;

    /// One-time hardware bring-up, run by the [`BotRunner`] before the first
    /// loop. Device zeroing, sensor baselines, and calibration belong here.
    #[allow(unused_variables)]
    fn init(
        &mut self,
        serial_tx: &mut serial::Client,
        serial_rx: &mut serial::Server,
    ) -> BotResult<()> {
        Ok(())
    }

    /// Always runs except in an emergency state, before the state specific
    /// function. Sensor request/update traffic belongs here so that every
    /// state sees fresh readings.
    #[allow(unused_variables)]
    fn run_base(
        &mut self,
        state: State,
        serial_tx: &mut serial::Client,
        serial_rx: &mut serial::Server,
    ) -> BotResult<State> {
        Ok(state)
    }

    /// The scripted autonomous period. `stop` is raised when the routine
    /// should end early; implementations must check it between steps.
    ///
    /// # Returns
    ///
    /// The state to continue in, usually `State::Disabled` once the script
    /// has run its course. An `Err` moves the bot to emergency.
    #[allow(unused_variables)]
    fn run_auto(
        &mut self,
        time: time::Instant,
        stop: &AtomicBool,
        serial_tx: &mut serial::Client,
        serial_rx: &mut serial::Server,
    ) -> BotResult<State> {
        Ok(State::Auto(Some(time)))
    }

    /// The driver controlled period, holds gamepad input and motor setting.
    ///
    /// # Returns
    ///
    /// The state to continue in. An `Err` moves the bot to emergency.
    #[allow(unused_variables)]
    fn run_teleop(
        &mut self,
        time: time::Instant,
        gp_inputs: &mut gilrs::Gilrs,
        serial_tx: &mut serial::Client,
        serial_rx: &mut serial::Server,
    ) -> BotResult<State> {
        Ok(State::TeleOp(Some(time)))
    }

    /// May not operate physically moving devices.
    #[allow(unused_variables)]
    fn run_disabled(
        &mut self,
        time: time::Instant,
        serial_tx: &mut serial::Client,
        serial_rx: &mut serial::Server,
    ) -> BotResult<State> {
        Ok(State::Disabled(Some(time)))
    }

    /// Run as little as possible, this state is only entered when something
    /// has gone very wrong.
    #[allow(unused_variables)]
    fn run_emergency(&mut self, time: time::Instant) -> BotResult<State> {
        Ok(State::Emergency(Some(time)))
    }
}

/// A state a [`Bot`] can be in. Every variant holds the time it was entered,
/// populated once it is used to set a runner's state.
#[derive(Clone, Copy, Debug)]
pub enum State {
    /// Running the scripted autonomous period.
    Auto(Option<time::Instant>),

    /// Under driver control.
    TeleOp(Option<time::Instant>),

    /// Moving devices are held at zero power.
    Disabled(Option<time::Instant>),

    /// Something has gone wrong enough that the bot does nothing at all.
    Emergency(Option<time::Instant>),
}

/// Result of a run function related to the [`Bot`] trait or [`BotRunner`].
pub type BotResult<T> = Result<T, BotError>;

/// An error from within a run function related to the [`Bot`] trait or
/// [`BotRunner`].
#[derive(Clone, Debug)]
pub struct BotError {
    pub msg: String,
}

impl BotError {
    #[must_use]
    pub fn new(msg: String) -> Self {
        Self { msg }
    }
}

impl Error for BotError {}

impl Display for BotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error running bot: {}", self.msg)
    }
}

/// Convenience for raising the stop flag from a signal handler or test.
pub fn request_stop(flag: &AtomicBool) {
    flag.store(true, Ordering::Relaxed);
}

/// Whether the stop flag has been raised.
#[must_use]
pub fn stop_requested(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::{Bot, BotError, BotResult, BotRunner, State};
    use crate::serial::{self, TestGpioIn, TestGpioOut};
    use gpio::GpioValue;
    use std::{sync::mpsc, time};

    /// A bot whose emergency handler itself fails.
    struct FaultyBot;

    impl Bot for FaultyBot {
        const TX_CLOCK: u16 = 0u16;
        const TX_DATA: u16 = 1u16;
        const RX_CLOCK: u16 = 2u16;
        const RX_DATA: u16 = 3u16;
        const SERIAL_CYCLE: time::Duration = time::Duration::from_millis(1u64);

        fn run_emergency(&mut self, _time: time::Instant) -> BotResult<State> {
            Err(BotError::new(String::from("emergency handler failed")))
        }
    }

    #[test]
    fn emergency_errors_keep_the_emergency_state() {
        let (clock_tx, clock_rx) = mpsc::channel();
        let (data_tx, data_rx) = mpsc::channel();
        let (in_clock_tx, in_clock_rx) = mpsc::channel();
        let (in_data_tx, in_data_rx) = mpsc::channel();

        let tx = serial::Client::new(
            TestGpioOut::new(clock_tx),
            TestGpioOut::new(data_tx),
            time::Duration::from_millis(1),
        );
        let rx = serial::Server::new(
            TestGpioIn::new(in_clock_rx, GpioValue::Low),
            TestGpioIn::new(in_data_rx, GpioValue::Low),
        );

        let mut runner = BotRunner::with_bus(FaultyBot, tx, rx).unwrap();
        runner.set_state(State::Emergency(None));

        // Neither call may panic, and the bot must stay in emergency.
        runner.run();
        runner.run();
        assert!(matches!(runner.state(), State::Emergency(Some(_))));

        drop((clock_rx, data_rx, in_clock_tx, in_data_tx));
    }
}
