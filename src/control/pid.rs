#[cfg(not(feature = "std"))]
use num_traits::Float;

use crate::error::{Error, Result};

/// Normalization of the integral and derivative parts of the control law.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PidForm {
    /// `u = K*e + K/Ti*integral(e) + K*Td*derivative(e)`
    #[default]
    Classic,
    /// `u = K*e + Ti*integral(e) + Td*derivative(e)`, where `Ti` and `Td` act as gains.
    Parallel,
}

/// Tuning of a single PID controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidConfig {
    /// Gain
    pub k: f32,
    /// Integration time
    pub ti: f32,
    /// Derivative time
    pub td: f32,
    /// Proportional set-point weight in [0, 1]
    pub beta: f32,
    /// Derivative set-point weight in [0, 1]
    pub gamma: f32,
    /// Derivative action filter constant
    pub n: f32,
    pub lower_limit: f32,
    pub upper_limit: f32,
    /// Scaling of the control signal into physical units
    pub scaling: f32,
    /// Static offset added before scaling
    pub offset: f32,
    pub use_integral_action: bool,
    /// Back-calculation of the integral part while the output is saturated
    pub anti_windup: bool,
    pub form: PidForm,
}

impl PidConfig {
    /// Create an unbounded, unscaled controller without integral action.
    pub fn new(k: f32, ti: f32, td: f32) -> Self {
        Self {
            k,
            ti,
            td,
            beta: 1.,
            gamma: 0.,
            n: 10.,
            lower_limit: f32::NEG_INFINITY,
            upper_limit: f32::INFINITY,
            scaling: 1.,
            offset: 0.,
            use_integral_action: false,
            anti_windup: true,
            form: PidForm::Classic,
        }
    }

    /// Builder method to set `beta` and `gamma` and return `self`
    pub fn with_setpoint_weights(mut self, beta: f32, gamma: f32) -> Self {
        self.beta = beta;
        self.gamma = gamma;
        self
    }

    /// Builder method to set `n` and return `self`
    pub fn with_derivative_filter(mut self, n: f32) -> Self {
        self.n = n;
        self
    }

    /// Builder method to set the saturation limits and return `self`
    pub fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.lower_limit = lower;
        self.upper_limit = upper;
        self
    }

    /// Builder method to set `scaling` and `offset` and return `self`
    pub fn with_output(mut self, scaling: f32, offset: f32) -> Self {
        self.scaling = scaling;
        self.offset = offset;
        self
    }

    /// Builder method to set `use_integral_action` and return `self`
    pub fn with_integral_action(mut self, use_integral_action: bool) -> Self {
        self.use_integral_action = use_integral_action;
        self
    }

    /// Builder method to set `anti_windup` and return `self`
    pub fn with_anti_windup(mut self, anti_windup: bool) -> Self {
        self.anti_windup = anti_windup;
        self
    }

    /// Builder method to set `form` and return `self`
    pub fn with_form(mut self, form: PidForm) -> Self {
        self.form = form;
        self
    }

    /// Anti-windup tracking time.
    ///
    /// Rule of thumb `sqrt(Ti*Td)`, falling back to `Ti` for controllers without derivative action.
    pub fn tracking_time(&self) -> f32 {
        let tt = (self.ti * self.td).sqrt();
        if tt > 0. {
            tt
        } else {
            self.ti
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = [
            self.k,
            self.ti,
            self.td,
            self.beta,
            self.gamma,
            self.n,
            self.scaling,
            self.offset,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidConfig("pid terms must be finite"));
        }
        if self.ti < 0. || self.td < 0. || self.n < 0. {
            return Err(Error::InvalidConfig(
                "pid times and filter constant must be non-negative",
            ));
        }
        if self.lower_limit.is_nan()
            || self.upper_limit.is_nan()
            || self.lower_limit > self.upper_limit
        {
            return Err(Error::InvalidConfig("pid lower limit exceeds upper limit"));
        }
        Ok(())
    }
}

/// The running proportional, integral and derivative parts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

/// PID controller with set-point weighting, a filtered derivative and
/// back-calculation anti-windup.
#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    config: PidConfig,
    /// Control period in seconds
    dt: f32,
    tt: f32,
    terms: PidTerms,
    pre_state: f32,
    pre_ref: f32,
    output: f32,
}

impl PidController {
    /// Create a controller running every `dt` seconds.
    pub fn new(config: PidConfig, dt: f32) -> Result<Self> {
        config.validate()?;
        if !dt.is_finite() || dt <= 0. {
            return Err(Error::InvalidConfig("control period must be positive"));
        }

        Ok(Self {
            tt: config.tracking_time(),
            config,
            dt,
            terms: PidTerms::default(),
            pre_state: 0.,
            pre_ref: 0.,
            output: 0.,
        })
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    pub fn terms(&self) -> &PidTerms {
        &self.terms
    }

    pub fn tracking_time(&self) -> f32 {
        self.tt
    }

    /// The last saturated control signal.
    pub fn output(&self) -> f32 {
        self.output
    }

    /// Clear the running terms and history.
    pub fn reset(&mut self) {
        self.terms = PidTerms::default();
        self.pre_state = 0.;
        self.pre_ref = 0.;
        self.output = 0.;
    }

    /// Move the stored state and reference by `offset`.
    ///
    /// Used when an angle is re-wrapped, so the derivative sees no jump.
    pub fn shift_history(&mut self, offset: f32) {
        self.pre_state += offset;
        self.pre_ref += offset;
    }

    /// Update the controller with the current state and reference and return the control signal.
    ///
    /// A non-finite input holds the previous output without touching the controller.
    pub fn update(&mut self, state: f32, reference: f32) -> f32 {
        if !state.is_finite() || !reference.is_finite() {
            return self.output;
        }

        let c = &self.config;
        let dt = self.dt;
        let error = reference - state;

        // Set-point weighting reduces the proportional kick on reference steps
        self.terms.p = c.k * (c.beta * reference - state);

        if c.use_integral_action {
            match c.form {
                PidForm::Classic => {
                    if c.ti > 0. {
                        self.terms.i += c.k * dt / c.ti * error;
                    }
                }
                PidForm::Parallel => self.terms.i += c.ti * dt * error,
            }
        }

        // First order filtered derivative of the weighted error
        let denominator = c.td + c.n * dt;
        self.terms.d = if denominator > 0. {
            let gain = match c.form {
                PidForm::Classic => c.k * c.td * c.n,
                PidForm::Parallel => c.td * c.n,
            } / denominator;

            c.td / denominator * self.terms.d
                + gain * (c.gamma * (reference - self.pre_ref) - (state - self.pre_state))
        } else {
            0.
        };

        let raw = (self.terms.p + self.terms.i + self.terms.d + c.offset) * c.scaling;
        let saturated = raw.max(c.lower_limit).min(c.upper_limit);

        // Back-calculation pulls the integral towards the saturated output
        if c.use_integral_action && c.anti_windup && self.tt > 0. {
            self.terms.i += dt / self.tt * (saturated - raw);
        }

        self.pre_state = state;
        self.pre_ref = reference;
        self.output = saturated;
        saturated
    }
}
