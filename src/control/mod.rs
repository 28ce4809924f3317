//! Attitude and vertical velocity control.
//!
//! The [`PidBank`] runs four independently tuned [`PidController`]s, one per control axis,
//! and outputs [`ControlSignals`] in physical units for the motor mixer.

mod pid;
pub use pid::{PidConfig, PidController, PidForm, PidTerms};

use core::f32::consts::TAU;

use crate::error::Result;
use crate::rotation::{wrap_pi, Attitude};

/// Gravitational acceleration (m/s^2).
pub const G_ACC: f32 = 9.81;

/// Vehicle mass (kg).
pub const MASS: f32 = 1.2;

/// Moments of inertia (kg*m^2).
pub const IXX: f32 = 0.0135;
pub const IYY: f32 = 0.0135;
pub const IZZ: f32 = 0.0239;

/// Four motors with 11x3.7 propellers each lift about 12 N.
pub const MAX_THRUST: f32 = 48.;

pub const MAX_ROLLPITCH_MOM: f32 = 2.7;
pub const MAX_YAW_MOM: f32 = 0.6;

// Roll and pitch angle control
const K_RP: f32 = 40.;
const TI_RP: f32 = 2.;
const TD_RP: f32 = 0.25;
const BETA_RP: f32 = 1.;
const GAMMA_RP: f32 = 0.;
const N_RP: f32 = 10.;

// Yaw angle control
const K_YR: f32 = 10.;
const TI_YR: f32 = 4.;
const TD_YR: f32 = 0.1;
const BETA_YR: f32 = 1.;
const GAMMA_YR: f32 = 0.;
const N_YR: f32 = 10.;

// Vertical velocity control
const K_VZ: f32 = 6.;
const TI_VZ: f32 = 3.;
const TD_VZ: f32 = 0.1;
const BETA_VZ: f32 = 1.;
const GAMMA_VZ: f32 = 0.;
const N_VZ: f32 = 10.;

/// Control signals handed to the motor mixer once per control period.
///
/// The body z axis points down, so lifting thrust is negative.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlSignals {
    /// Collective thrust (N)
    pub thrust: f32,
    /// Moments (N*m)
    pub roll_moment: f32,
    pub pitch_moment: f32,
    pub yaw_moment: f32,
}

/// Setpoints for the four control axes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct References {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    /// Vertical velocity (m/s, positive down)
    pub vertical_velocity: f32,
}

/// The measured state of the four control axes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    pub attitude: Attitude,
    /// Vertical velocity (m/s, positive down)
    pub vertical_velocity: f32,
}

/// The running terms of every controller, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlTerms {
    pub altitude: PidTerms,
    pub roll: PidTerms,
    pub pitch: PidTerms,
    pub yaw: PidTerms,
}

/// Tuning of the four controllers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidBankConfig {
    pub altitude: PidConfig,
    pub roll: PidConfig,
    pub pitch: PidConfig,
    pub yaw: PidConfig,
}

impl Default for PidBankConfig {
    fn default() -> Self {
        // Scaled with mass to obtain thrust force, offset by gravity since Z points to earth
        let altitude = PidConfig::new(K_VZ, TI_VZ, TD_VZ)
            .with_setpoint_weights(BETA_VZ, GAMMA_VZ)
            .with_derivative_filter(N_VZ)
            .with_limits(-MAX_THRUST, 0.)
            .with_output(MASS, -G_ACC);

        let roll = PidConfig::new(K_RP, TI_RP, TD_RP)
            .with_setpoint_weights(BETA_RP, GAMMA_RP)
            .with_derivative_filter(N_RP)
            .with_limits(-MAX_ROLLPITCH_MOM, MAX_ROLLPITCH_MOM)
            .with_output(IXX, 0.);

        let pitch = roll.with_output(IYY, 0.);

        let yaw = PidConfig::new(K_YR, TI_YR, TD_YR)
            .with_setpoint_weights(BETA_YR, GAMMA_YR)
            .with_derivative_filter(N_YR)
            .with_limits(-MAX_YAW_MOM, MAX_YAW_MOM)
            .with_output(IZZ, 0.);

        Self {
            altitude,
            roll,
            pitch,
            yaw,
        }
    }
}

impl PidBankConfig {
    pub fn validate(&self) -> Result<()> {
        self.altitude.validate()?;
        self.roll.validate()?;
        self.pitch.validate()?;
        self.yaw.validate()
    }
}

/// The vertical, roll, pitch and yaw controllers.
#[derive(Debug, Clone, PartialEq)]
pub struct PidBank {
    altitude: PidController,
    roll: PidController,
    pitch: PidController,
    yaw: PidController,
    /// Last yaw fed to the yaw controller, continuous across the (-PI, PI] seam
    yaw_state: Option<f32>,
}

impl PidBank {
    /// Create the controllers for a control period of `dt` seconds.
    pub fn new(config: &PidBankConfig, dt: f32) -> Result<Self> {
        Ok(Self {
            altitude: PidController::new(config.altitude, dt)?,
            roll: PidController::new(config.roll, dt)?,
            pitch: PidController::new(config.pitch, dt)?,
            yaw: PidController::new(config.yaw, dt)?,
            yaw_state: None,
        })
    }

    /// Run every controller once and return the control signals.
    pub fn update(&mut self, state: &ControlState, reference: &References) -> ControlSignals {
        let attitude = &state.attitude;
        let yaw = self.continuous_yaw(attitude.yaw);

        // Move the yaw reference next to the current yaw so the error lies in (-PI, PI]
        let yaw_reference = yaw + wrap_pi(reference.yaw - yaw);

        ControlSignals {
            thrust: self
                .altitude
                .update(state.vertical_velocity, reference.vertical_velocity),
            roll_moment: self.roll.update(attitude.roll, reference.roll),
            pitch_moment: self.pitch.update(attitude.pitch, reference.pitch),
            yaw_moment: self.yaw.update(yaw, yaw_reference),
        }
    }

    /// Unwrap the measured yaw next to the previous one.
    fn continuous_yaw(&mut self, measured: f32) -> f32 {
        if !measured.is_finite() {
            return measured;
        }

        let yaw = match self.yaw_state {
            Some(previous) => previous + wrap_pi(measured - previous),
            None => measured,
        };

        // Re-wrap after a full turn, the controller history moves along
        let yaw = if yaw.abs() > TAU {
            self.yaw.shift_history(measured - yaw);
            measured
        } else {
            yaw
        };

        self.yaw_state = Some(yaw);
        yaw
    }

    /// Re-initialize every controller.
    pub fn reset(&mut self) {
        self.altitude.reset();
        self.roll.reset();
        self.pitch.reset();
        self.yaw.reset();
        self.yaw_state = None;
    }

    pub fn terms(&self) -> ControlTerms {
        ControlTerms {
            altitude: *self.altitude.terms(),
            roll: *self.roll.terms(),
            pitch: *self.pitch.terms(),
            yaw: *self.yaw.terms(),
        }
    }

    pub fn altitude(&self) -> &PidController {
        &self.altitude
    }

    pub fn roll(&self) -> &PidController {
        &self.roll
    }

    pub fn pitch(&self) -> &PidController {
        &self.pitch
    }

    pub fn yaw(&self) -> &PidController {
        &self.yaw
    }
}
