pub mod machine;

pub use machine::{CheckEvent, CheckSession, Effect, SessionSnapshot};
