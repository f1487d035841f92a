//! Error types for the core.
//!
//! During construction every error is fatal (the core cannot partially
//! initialize a `Grid`). During integration, errors are instead encoded in
//! the `errorcode` returned by `Integrator::step_ode`: the error types here
//! back both paths.

error_chain! {
    errors {
        /// Bad or missing field in a `Configuration`. Fatal on construction.
        ConfigurationInvalid(detail: String) {
            description("invalid configuration")
            display("invalid configuration: {}", detail)
        }
        /// Explicit range check failed (e.g. demag-coefficient index
        /// overflow). Fatal.
        NumericOverflow(detail: String) {
            description("numeric overflow")
            display("numeric overflow: {}", detail)
        }
        /// The step controller could not find an accepted step at or above
        /// `min_step`. Non-fatal; surfaced through `step_ode` with
        /// `errorcode > 0`.
        StepTooSmall(step_size: f64, min_step: f64) {
            description("step size too small")
            display("step size {:e} fell below min_step {:e}", step_size, min_step)
        }
        /// An applied-field file loader or dumper failed. Non-fatal; an
        /// appropriate default (e.g. zero field) is substituted.
        FileIo(detail: String) {
            description("file I/O error")
            display("file I/O error: {}", detail)
        }
        /// Anisotropy axes are not unit-length or not mutually orthogonal.
        /// Fatal on `Cell` construction.
        InvalidAxis(detail: String) {
            description("invalid anisotropy axis")
            display("invalid anisotropy axis: {}", detail)
        }
    }
}
