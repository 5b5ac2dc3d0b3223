//! The fixed command table.
//!
//! Public command names map to a remote method on the device plus a flag
//! saying whether caller-supplied parameters are forwarded. The table is
//! a closed enum, so the mapping is checked at compile time; string
//! lookup happens once, at the HTTP boundary, and unknown names fail to
//! parse before any device call is attempted.

use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// A supported vacuum command.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    StartCleaning,
    PauseCleaning,
    StopCleaning,
    Dock,
    Spot,
    Goto,
}

impl Command {
    /// The method name the device protocol exposes for this command.
    pub fn remote_method(self) -> &'static str {
        match self {
            Command::StartCleaning => "app_start",
            // The device has no distinct stop; both map to pause.
            Command::PauseCleaning | Command::StopCleaning => "app_pause",
            Command::Dock => "app_charge",
            Command::Spot => "app_spot",
            Command::Goto => "app_goto_target",
        }
    }

    /// Whether caller-supplied parameters are forwarded to the device.
    pub fn forwards_params(self) -> bool {
        matches!(self, Command::Goto)
    }

    /// Public name, as accepted over HTTP.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Every accepted command name, for rejection messages.
    pub fn allowed_names() -> Vec<&'static str> {
        Command::iter().map(Command::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("start_cleaning", "app_start", false)]
    #[test_case("pause_cleaning", "app_pause", false)]
    #[test_case("stop_cleaning", "app_pause", false)]
    #[test_case("dock", "app_charge", false)]
    #[test_case("spot", "app_spot", false)]
    #[test_case("goto", "app_goto_target", true)]
    fn table_entry(name: &str, method: &str, forwards: bool) {
        let command: Command = name.parse().unwrap();
        assert_eq!(command.remote_method(), method);
        assert_eq!(command.forwards_params(), forwards);
        assert_eq!(command.name(), name);
    }

    #[test_case(""; "empty")]
    #[test_case("fly_to_moon"; "unknown name")]
    #[test_case("Start_Cleaning"; "wrong case")]
    #[test_case("app_start"; "remote method is not a public name")]
    fn unknown_names_do_not_resolve(name: &str) {
        assert!(name.parse::<Command>().is_err());
    }

    #[test]
    fn allowed_names_enumerates_the_whole_table() {
        let names = Command::allowed_names();
        assert_eq!(
            names,
            vec![
                "start_cleaning",
                "pause_cleaning",
                "stop_cleaning",
                "dock",
                "spot",
                "goto"
            ]
        );
    }
}
