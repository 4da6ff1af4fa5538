use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use super::{DeviceInfo, DriverError, SpectrometerDriver, SpectrometerHandle, TriggerMode};

// ---------------------------------------------------------------------------
// Synthetic lamp model
// ---------------------------------------------------------------------------

/// Emission lines as `(centre nm, sigma nm, counts at 50 ms)`.
pub const LAMP_LINES: [(f64, f64, f64); 4] = [
    (435.8, 1.2, 1800.0),
    (546.1, 1.0, 2600.0),
    (611.6, 1.5, 900.0),
    (763.5, 2.0, 1200.0),
];

/// Integration time the line amplitudes are quoted at.
const REFERENCE_INTEGRATION_MS: f64 = 50.0;

pub fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Evenly spaced wavelength axis from `start_nm` to `end_nm` inclusive.
pub fn linear_axis(pixels: usize, start_nm: f64, end_nm: f64) -> Vec<f64> {
    if pixels < 2 {
        return vec![start_nm; pixels];
    }
    let step = (end_nm - start_nm) / (pixels - 1) as f64;
    (0..pixels).map(|i| start_nm + i as f64 * step).collect()
}

/// Fixed-pattern sensor offset of pixel `i`; present with or without light.
pub fn dark_offset(i: usize) -> f64 {
    950.0 + 15.0 * (i as f64 * 0.37).sin()
}

/// One synthetic reading: dark offset, plus (when lit) a curved background
/// and the lamp lines scaled by exposure, plus Gaussian read noise.
pub fn synthetic_reading(
    wavelengths: &[f64],
    integration_ms: f64,
    light: bool,
    noise: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    let exposure = integration_ms / REFERENCE_INTEGRATION_MS;
    wavelengths
        .iter()
        .enumerate()
        .map(|(i, &wl)| {
            let signal = if light {
                let background = 120.0 + 0.0004 * (wl - 700.0).powi(2);
                let lines: f64 = LAMP_LINES
                    .iter()
                    .map(|&(mu, sigma, amp)| gaussian(wl, mu, sigma, amp))
                    .sum();
                exposure * (background + lines)
            } else {
                0.0
            };
            dark_offset(i) + signal + rng.gauss(0.0, noise)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    pub fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

// ---------------------------------------------------------------------------
// Simulated driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedConfig {
    pub pixels: usize,
    pub start_nm: f64,
    pub end_nm: f64,
    /// Standard deviation of the read noise, in counts.
    pub noise: f64,
    pub seed: u64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            pixels: 2048,
            start_nm: 340.0,
            end_nm: 1025.0,
            noise: 2.0,
            seed: 42,
        }
    }
}

#[derive(Debug)]
struct Bus {
    config: SimulatedConfig,
    present: AtomicBool,
    light: AtomicBool,
    opened: AtomicU64,
}

/// A spectrometer that exists only in memory.
///
/// Clones share one virtual USB bus, so a test can keep a clone to unplug
/// the device or switch the lamp off while a session owns the other.
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    bus: Arc<Bus>,
}

impl SimulatedDriver {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            bus: Arc::new(Bus {
                config,
                present: AtomicBool::new(true),
                light: AtomicBool::new(true),
                opened: AtomicU64::new(0),
            }),
        }
    }

    /// Remove the device from the bus; open handles start failing.
    pub fn unplug(&self) {
        self.bus.present.store(false, Ordering::SeqCst);
    }

    pub fn plug_in(&self) {
        self.bus.present.store(true, Ordering::SeqCst);
    }

    /// Switch the light source. Readings taken in the dark contain only
    /// the sensor offset and noise.
    pub fn set_light(&self, on: bool) {
        self.bus.light.store(on, Ordering::SeqCst);
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            model: format!("SIM-{}", self.bus.config.pixels),
            serial: "SIM00001".to_string(),
        }
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

impl SpectrometerDriver for SimulatedDriver {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DriverError> {
        if self.bus.present.load(Ordering::SeqCst) {
            Ok(vec![self.info()])
        } else {
            Ok(Vec::new())
        }
    }

    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn SpectrometerHandle>, DriverError> {
        if !self.bus.present.load(Ordering::SeqCst) || *device != self.info() {
            return Err(DriverError::Io(format!("no such device: {}", device.serial)));
        }
        let n = self.bus.opened.fetch_add(1, Ordering::SeqCst);
        let cfg = &self.bus.config;
        Ok(Box::new(SimulatedHandle {
            bus: Arc::clone(&self.bus),
            model: device.model.clone(),
            wavelengths: linear_axis(cfg.pixels, cfg.start_nm, cfg.end_nm),
            rng: SimpleRng::new(cfg.seed.wrapping_add(n)),
            integration_us: 0,
            trigger: TriggerMode::Normal,
            closed: false,
        }))
    }
}

struct SimulatedHandle {
    bus: Arc<Bus>,
    model: String,
    wavelengths: Vec<f64>,
    rng: SimpleRng,
    integration_us: u32,
    trigger: TriggerMode,
    closed: bool,
}

impl SimulatedHandle {
    fn check(&self) -> Result<(), DriverError> {
        if !self.bus.present.load(Ordering::SeqCst) {
            return Err(DriverError::Unplugged);
        }
        if self.closed {
            return Err(DriverError::Io("handle closed".to_string()));
        }
        Ok(())
    }
}

impl SpectrometerHandle for SimulatedHandle {
    fn model(&self) -> &str {
        &self.model
    }

    fn wavelengths(&mut self) -> Result<Vec<f64>, DriverError> {
        self.check()?;
        Ok(self.wavelengths.clone())
    }

    fn intensities(&mut self) -> Result<Vec<f64>, DriverError> {
        self.check()?;
        thread::sleep(Duration::from_micros(u64::from(self.integration_us)));
        // The device can vanish during the exposure.
        self.check()?;

        log::trace!("{} exposure done ({:?} trigger)", self.model, self.trigger);
        Ok(synthetic_reading(
            &self.wavelengths,
            f64::from(self.integration_us) / 1000.0,
            self.bus.light.load(Ordering::SeqCst),
            self.bus.config.noise,
            &mut self.rng,
        ))
    }

    fn set_integration_time_micros(&mut self, micros: u32) -> Result<(), DriverError> {
        self.check()?;
        self.integration_us = micros;
        Ok(())
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), DriverError> {
        self.check()?;
        self.trigger = mode;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        Ok(())
    }
}
