//! Kalman filter for object position tracking.
//!
//! Implements a constant-velocity model in 3-D space. Because the state is
//! exactly position + velocity and only position is ever observed, the
//! filter never forms the full 6×6 system: the covariance is kept as its
//! three distinct 3×3 blocks and every predict/update equation is written
//! in block form with the observation structure already folded in.

/// 3×3 matrix, row-major.
type Block = [[f64; 3]; 3];
/// 3-vector.
type Vec3 = [f64; 3];

/// Kalman filter state for one tracked object.
///
/// State: position p and velocity v (metres, m/s). Covariance:
///
/// ```text
///     ┌ Ppp  Ppv ┐
/// P = │          │      with Pvp = Ppvᵀ by construction
///     └ Pvp  Pvv ┘
/// ```
///
/// Only the `pp`, `pv`, and `vv` blocks are stored; the `vp` block is the
/// transpose of `pv` and never materialized. The diagonal blocks are
/// re-symmetrized after every correction, which keeps P positive-definite
/// across long miss streaks.
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState {
    /// Position estimate [px, py, pz]
    position: Vec3,
    /// Velocity estimate [vx, vy, vz]
    velocity: Vec3,
    /// Position-position covariance block
    cov_pp: Block,
    /// Position-velocity covariance block (velocity-position is its
    /// transpose)
    cov_pv: Block,
    /// Velocity-velocity covariance block
    cov_vv: Block,
    /// Process noise: σ_accel squared (m/s²)²
    process_noise_var: f64,
    /// Measurement noise: σ_obs squared (m)²
    obs_noise_var: f64,
}

impl KalmanState {
    /// Create new state from an initial position observation.
    ///
    /// Initial velocity is zero; the initial covariance P₀ = 10·I₆
    /// (10·I₃ on both diagonal blocks, zero cross-covariance) reflects
    /// high uncertainty in every state component.
    pub fn new(initial_position: Vec3, process_noise_var: f64, obs_noise_var: f64) -> Self {
        Self {
            position: initial_position,
            velocity: [0.0; 3],
            cov_pp: scaled_identity(10.0),
            cov_pv: [[0.0; 3]; 3],
            cov_vv: scaled_identity(10.0),
            process_noise_var,
            obs_noise_var,
        }
    }

    /// Predict forward by `dt_secs` using the constant-velocity model.
    ///
    /// With F = [[I, dt·I], [0, I]], the state moves as p ← p + dt·v and
    /// the covariance P ← F·P·Fᵀ + Q expands to
    ///
    /// ```text
    /// Ppp ← Ppp + dt·(Ppv + Ppvᵀ) + dt²·Pvv + q·dt⁴/4·I
    /// Ppv ← Ppv + dt·Pvv          + q·dt³/2·I
    /// Pvv ← Pvv                   + q·dt² ·I
    /// ```
    ///
    /// The Q terms are the discrete white-noise-acceleration process noise
    /// integrated over the step; since each is a scalar times identity,
    /// they collapse to diagonal additions.
    pub fn predict(&mut self, dt_secs: f64) {
        let dt = dt_secs;
        for axis in 0..3 {
            self.position[axis] += dt * self.velocity[axis];
        }

        let q = self.process_noise_var;
        let q_pp = q * dt.powi(4) / 4.0;
        let q_pv = q * dt.powi(3) / 2.0;
        let q_vv = q * dt.powi(2);

        // All three equations read the pre-predict blocks.
        let pv = self.cov_pv;
        let vv = self.cov_vv;
        for r in 0..3 {
            for c in 0..3 {
                self.cov_pp[r][c] += dt * (pv[r][c] + pv[c][r]) + dt * dt * vv[r][c];
                self.cov_pv[r][c] = pv[r][c] + dt * vv[r][c];
            }
            self.cov_pp[r][r] += q_pp;
            self.cov_pv[r][r] += q_pv;
            self.cov_vv[r][r] += q_vv;
        }
    }

    /// Update the filter with a 3-D position observation.
    ///
    /// Only position is observed, so the innovation covariance is simply
    /// S = Ppp + σ_obs²·I and the gain splits into a position block
    /// Kp = Ppp·S⁻¹ and a velocity block Kv = Ppvᵀ·S⁻¹:
    ///
    /// ```text
    /// y   = z − p
    /// p   ← p + Kp·y            v   ← v + Kv·y
    /// Ppp ← (I − Kp)·Ppp        Ppv ← (I − Kp)·Ppv
    /// Pvv ← Pvv − Kv·Ppv
    /// ```
    ///
    /// followed by re-symmetrization of the diagonal blocks. (The cross
    /// block needs none: with Kv = Ppvᵀ·S⁻¹ the two off-diagonal blocks of
    /// (I − K·H)·P are already transposes of each other.)
    pub fn update(&mut self, observation: Vec3) {
        let innovation = [
            observation[0] - self.position[0],
            observation[1] - self.position[1],
            observation[2] - self.position[2],
        ];

        let mut s = self.cov_pp;
        for axis in 0..3 {
            s[axis][axis] += self.obs_noise_var;
        }
        let s_inv = match invert(&s) {
            Some(inv) => inv,
            // Singular S means degenerate geometry; skip the update.
            None => return,
        };

        let gain_p = multiply(&self.cov_pp, &s_inv);
        let gain_v = multiply(&transpose(&self.cov_pv), &s_inv);

        for r in 0..3 {
            for c in 0..3 {
                self.position[r] += gain_p[r][c] * innovation[c];
                self.velocity[r] += gain_v[r][c] * innovation[c];
            }
        }

        // I − Kp applied from the left to the position row of blocks; the
        // velocity block shrinks by Kv times the pre-update cross block.
        let mut residual = scaled_identity(1.0);
        for r in 0..3 {
            for c in 0..3 {
                residual[r][c] -= gain_p[r][c];
            }
        }
        let old_pv = self.cov_pv;
        self.cov_pp = symmetrize(&multiply(&residual, &self.cov_pp));
        self.cov_pv = multiply(&residual, &old_pv);

        let shrink = multiply(&gain_v, &old_pv);
        let mut vv = self.cov_vv;
        for r in 0..3 {
            for c in 0..3 {
                vv[r][c] -= shrink[r][c];
            }
        }
        self.cov_vv = symmetrize(&vv);
    }

    /// Current position estimate [px, py, pz].
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Current velocity estimate [vx, vy, vz].
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Scalar position uncertainty: the trace of Ppp, i.e.
    /// σ²_px + σ²_py + σ²_pz.
    pub fn position_uncertainty(&self) -> f64 {
        self.cov_pp[0][0] + self.cov_pp[1][1] + self.cov_pp[2][2]
    }
}

// ---------------------------------------------------------------------------
// 3×3 block helpers
// ---------------------------------------------------------------------------

fn scaled_identity(value: f64) -> Block {
    let mut m = [[0.0; 3]; 3];
    for axis in 0..3 {
        m[axis][axis] = value;
    }
    m
}

fn multiply(a: &Block, b: &Block) -> Block {
    let mut out = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            out[r][c] = a[r][0] * b[0][c] + a[r][1] * b[1][c] + a[r][2] * b[2][c];
        }
    }
    out
}

fn transpose(m: &Block) -> Block {
    let mut out = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            out[r][c] = m[c][r];
        }
    }
    out
}

/// (M + Mᵀ) / 2.
fn symmetrize(m: &Block) -> Block {
    let mut out = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            out[r][c] = 0.5 * (m[r][c] + m[c][r]);
        }
    }
    out
}

/// Inverse via the adjugate; `None` when |det| < 1e-12.
fn invert(m: &Block) -> Option<Block> {
    let adj = [
        [
            m[1][1] * m[2][2] - m[1][2] * m[2][1],
            m[0][2] * m[2][1] - m[0][1] * m[2][2],
            m[0][1] * m[1][2] - m[0][2] * m[1][1],
        ],
        [
            m[1][2] * m[2][0] - m[1][0] * m[2][2],
            m[0][0] * m[2][2] - m[0][2] * m[2][0],
            m[0][2] * m[1][0] - m[0][0] * m[1][2],
        ],
        [
            m[1][0] * m[2][1] - m[1][1] * m[2][0],
            m[0][1] * m[2][0] - m[0][0] * m[2][1],
            m[0][0] * m[1][1] - m[0][1] * m[1][0],
        ],
    ];

    let det = m[0][0] * adj[0][0] + m[0][1] * adj[1][0] + m[0][2] * adj[2][0];
    if det.abs() < 1e-12 {
        return None;
    }

    let mut out = adj;
    for row in &mut out {
        for cell in row {
            *cell /= det;
        }
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
