//! Closed vocabularies used on applications.
//!
//! Wire values are kept exactly as stored by the school's existing data,
//! including the historical spellings of the status values.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crm_core::DomainError;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(DomainError::validation(format!(
                        "{} must be one of [{}], got '{}'",
                        $label,
                        [$($wire),+].join(", "),
                        other
                    ))),
                }
            }
        }
    };
}

wire_enum!(
    /// Course the lead is interested in.
    Course, "course" {
        Fs => "FS",
        Qacx => "QACX",
        Jcx => "JCX",
        Jscx => "JSCX",
        Fe => "FE",
        Pcx => "PCX",
    }
);

wire_enum!(
    /// Commercial package.
    CourseType, "course_type" {
        Pro => "pro",
        Minimal => "minimal",
        Premium => "premium",
        Incubator => "incubator",
        Vip => "vip",
    }
);

wire_enum!(
    /// Attendance format.
    CourseFormat, "course_format" {
        Static => "static",
        Online => "online",
    }
);

wire_enum!(
    /// Sales pipeline status.
    ApplicationStatus, "status" {
        InWork => "In work",
        New => "New",
        Agree => "Aggre",
        Disagree => "Disaggre",
        Dubbing => "Dubbing",
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_parse_and_render() {
        for status in ApplicationStatus::ALL {
            assert_eq!(status.as_str().parse::<ApplicationStatus>().unwrap(), *status);
        }
        assert_eq!("In work".parse::<ApplicationStatus>().unwrap(), ApplicationStatus::InWork);
        assert_eq!(Course::Jscx.to_string(), "JSCX");
    }

    #[test]
    fn unknown_value_lists_allowed_ones() {
        let err = "evening".parse::<CourseFormat>().unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("course_format must be one of [static, online], got 'evening'")
        );
    }

    #[test]
    fn serde_uses_wire_values() {
        let json = serde_json::to_value(ApplicationStatus::Disagree).unwrap();
        assert_eq!(json, "Disaggre");
        let t: CourseType = serde_json::from_value(serde_json::json!("vip")).unwrap();
        assert_eq!(t, CourseType::Vip);
    }
}
