//! Resistance-to-temperature calibration curves.
//!
//! Every thermometer on the rigs is a resistor read out by the AVS-47
//! bridge; temperature comes from a per-sensor polynomial fit performed in
//! log-log space. A [`CalibrationCurve`] holds the fit: coefficients
//! (lowest degree first), the inclusive resistance domain the fit is valid
//! over, an input divisor for fits done in kilo-ohms, and an output scale
//! for fits that produce millikelvin.
//!
//! Evaluation is `10^(poly(log10(r)))` scaled into kelvin. The fits are
//! high order (up to 10 coefficients), so coefficient order and the
//! direction of the log/power transform are load-bearing; the tables below
//! are copied digit for digit from the lab's fit results and must not be
//! reformatted or rounded.
//!
//! Outside its domain a curve cannot say anything: the historical contract
//! is the sentinel value `0`, which downstream log readers rely on. New
//! code should prefer [`CalibrationCurve::try_evaluate`], which makes
//! "uncalibratable" unmistakable.

use std::ops::RangeInclusive;

/// Mixing-chamber Pt1000 fit, kelvin output, domain 25–1400 Ω.
const PT1000_COEFFS: [f64; 10] = [
    -469.544790033,
    2142.429105073,
    -4278.355519358,
    4917.129912473,
    -3583.140137551,
    1717.059717072,
    -541.269035711,
    108.277676198,
    -12.478784052,
    0.631579503,
];

/// RuO2 10 kΩ fit, millikelvin output, domain 10.8–320 kΩ (input in kΩ).
const RUO2_10K_COEFFS: [f64; 10] = [
    6909.149278051,
    -38314.105969326,
    93795.121719782,
    -132881.190697614,
    120024.664196962,
    -71674.983797385,
    28300.34446649,
    -7125.704599868,
    1038.446472548,
    -66.75479913,
];

/// RuO2 1.5 kΩ fit, millikelvin output, domain 2–17 kΩ.
const RUO2_1K5_COEFFS: [f64; 10] = [
    -109406225.453069,
    264570367.275206,
    -284130767.924156,
    177858095.325872,
    -71516430.0477208,
    19156216.6038666,
    -3418108.54721648,
    391778.170838493,
    -26174.3212975398,
    776.590777082747,
];

/// TT1304 fit (straight-probe mixing chamber), millikelvin output.
const TT1304_COEFFS: [f64; 10] = [
    -85991.97200244224,
    170101.13604422542,
    -146816.39437206375,
    72250.85152375244,
    -22180.90228857295,
    4351.18582667978,
    -532.76537613975,
    37.23402757752,
    -1.13741001238,
    0.0,
];

/// TT1305 fit (fridge mixing chamber), millikelvin output.
const TT1305_COEFFS: [f64; 10] = [
    -163733.07258096553,
    333718.31665939908,
    -296819.44270129508,
    150507.78635092167,
    -47595.4776533601,
    9613.0779306768,
    -1211.12055853135,
    87.02647862814,
    -2.73081792303,
    0.0,
];

/// TT1308 fit (rotator-probe mixing chamber), millikelvin output.
const TT1308_COEFFS: [f64; 10] = [
    252133.15476484009,
    -489555.75060558028,
    414687.06848509354,
    -200136.59816212513,
    60188.36749358858,
    -11549.4276043042,
    1380.88202910224,
    -94.0528605672,
    2.79391775134,
    0.0,
];

/// S0927 fit, millikelvin output, domain 600 Ω–100 kΩ.
const S0927_COEFFS: [f64; 6] = [
    340.0066359697,
    -428.9444332334,
    219.360664071,
    -56.2474119288,
    7.2087047046,
    -0.3691158405,
];

/// One sensor's resistance→temperature conversion.
///
/// Immutable after construction; evaluation is a pure function of the
/// input resistance. Construct via the per-family associated functions
/// ([`CalibrationCurve::pt1000`] and friends).
#[derive(Debug, Clone)]
pub struct CalibrationCurve {
    /// Sensor family the fit belongs to (documentation only).
    family: &'static str,
    /// Polynomial coefficients, lowest degree first.
    coefficients: &'static [f64],
    /// Inclusive validity domain in the curve's working unit (ohms, or
    /// kilo-ohms when `input_divisor` is 1000).
    domain: RangeInclusive<f64>,
    /// Divisor applied to the raw resistance before the domain test and
    /// the logarithm (1000 for fits done in kΩ).
    input_divisor: f64,
    /// Factor applied to the power-of-ten result (0.001 for fits that
    /// produce millikelvin).
    output_scale: f64,
}

impl CalibrationCurve {
    /// Pt1000 platinum thermometer (mixing-chamber "high" sensors on the
    /// fridge and both probes).
    pub fn pt1000() -> Self {
        Self {
            family: "Pt1000",
            coefficients: &PT1000_COEFFS,
            domain: 25.0..=1400.0,
            input_divisor: 1.0,
            output_scale: 1.0,
        }
    }

    /// RuO2 10 kΩ thick-film resistor (3K stages, stills, magnet).
    pub fn ruo2_10k() -> Self {
        Self {
            family: "RuO2-10k",
            coefficients: &RUO2_10K_COEFFS,
            domain: 10.8..=320.0,
            input_divisor: 1000.0,
            output_scale: 1e-3,
        }
    }

    /// RuO2 1.5 kΩ thick-film resistor (50 mK plates).
    pub fn ruo2_1k5() -> Self {
        Self {
            family: "RuO2-1k5",
            coefficients: &RUO2_1K5_COEFFS,
            domain: 2000.0..=17000.0,
            input_divisor: 1.0,
            output_scale: 1e-3,
        }
    }

    /// TT1304 thermometer on the straight-probe mixing chamber.
    pub fn tt1304() -> Self {
        Self {
            family: "TT1304",
            coefficients: &TT1304_COEFFS,
            domain: 1600.0..=75000.0,
            input_divisor: 1.0,
            output_scale: 1e-3,
        }
    }

    /// TT1305 thermometer on the fridge mixing chamber.
    pub fn tt1305() -> Self {
        Self {
            family: "TT1305",
            coefficients: &TT1305_COEFFS,
            domain: 1600.0..=75000.0,
            input_divisor: 1.0,
            output_scale: 1e-3,
        }
    }

    /// TT1308 thermometer on the rotator-probe mixing chamber.
    pub fn tt1308() -> Self {
        Self {
            family: "TT1308",
            coefficients: &TT1308_COEFFS,
            domain: 1600.0..=75000.0,
            input_divisor: 1.0,
            output_scale: 1e-3,
        }
    }

    /// S0927 thermometer.
    pub fn s0927() -> Self {
        Self {
            family: "S0927",
            coefficients: &S0927_COEFFS,
            domain: 600.0..=100000.0,
            input_divisor: 1.0,
            output_scale: 1e-3,
        }
    }

    /// Sensor family label.
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Convert a resistance in ohms to kelvin.
    ///
    /// Returns `None` when the (scaled) resistance falls strictly outside
    /// the fit's inclusive domain, including for zero, negative or NaN
    /// input — the logarithm is never reached for those, so this cannot
    /// panic or produce a NaN temperature from bad input.
    pub fn try_evaluate(&self, resistance_ohms: f64) -> Option<f64> {
        let r = resistance_ohms / self.input_divisor;
        if !self.domain.contains(&r) {
            return None;
        }
        let x = r.log10();
        let p = self
            .coefficients
            .iter()
            .rev()
            .fold(0.0_f64, |acc, &c| acc * x + c);
        Some(10.0_f64.powf(p) * self.output_scale)
    }

    /// Convert a resistance in ohms to kelvin, with the historical
    /// out-of-range sentinel.
    ///
    /// Out-of-domain input yields `0.0`, which is **not** a temperature:
    /// callers must treat it as "no calibrated value". The sweep logs have
    /// always used this convention, so it is kept for compatibility;
    /// [`CalibrationCurve::try_evaluate`] is the unambiguous form.
    pub fn evaluate(&self, resistance_ohms: f64) -> f64 {
        self.try_evaluate(resistance_ohms).unwrap_or(0.0)
    }
}
