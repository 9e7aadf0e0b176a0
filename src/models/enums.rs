//! Shared domain enums
//!
//! Every enum here is stored as its text label (a `TEXT` column) and
//! serialized with the same label in the JSON API.

/// Declares a closed enum stored and serialized as fixed text labels.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize, ::utoipa::ToSchema,
        )]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// All variants, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(value: ::sqlx::postgres::PgValueRef<'r>) -> Result<Self, ::sqlx::error::BoxDynError> {
                let s = <&str as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut ::sqlx::postgres::PgArgumentBuffer) -> ::sqlx::encode::IsNull {
                <&str as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

pub(crate) use text_enum;

text_enum! {
    /// Inventory category; only consumables and liquids can be disposed
    Category {
        Consumable => "Consumable",
        Liquid => "Liquid",
        Equipment => "Equipment",
    }
}

impl Category {
    pub fn is_disposable(&self) -> bool {
        matches!(self, Category::Consumable | Category::Liquid)
    }
}

text_enum! {
    ItemStatus {
        Active => "Active",
        Inactive => "Inactive",
    }
}

text_enum! {
    /// Physical condition of an inventory item
    ItemCondition {
        Good => "Good",
        Fair => "Fair",
        NeedsRepair => "Needs Repair",
        UnderMaintenance => "Under Maintenance",
        OutOfStock => "Out of Stock",
        Damaged => "Damaged",
    }
}

text_enum! {
    MaintenanceNeeds {
        No => "No",
        Yes => "Yes",
        Scheduled => "Scheduled",
    }
}

text_enum! {
    BorrowerType {
        Student => "student",
        Faculty => "faculty",
        Guest => "guest",
    }
}

text_enum! {
    /// Damage reported on return, ordered from least to most severe
    DamageSeverity {
        None => "None",
        Minor => "Minor",
        Moderate => "Moderate",
        Severe => "Severe",
    }
}

impl DamageSeverity {
    /// Key of the severity in the `fees.damage` configuration table
    pub fn config_key(&self) -> &'static str {
        match self {
            DamageSeverity::None => "none",
            DamageSeverity::Minor => "minor",
            DamageSeverity::Moderate => "moderate",
            DamageSeverity::Severe => "severe",
        }
    }
}

text_enum! {
    DisposalMethod {
        Recycle => "Recycle",
        Donate => "Donate",
        Sell => "Sell",
        Destroy => "Destroy",
        Other => "Other",
    }
}

text_enum! {
    /// Service holds that take units out of circulation
    ServiceKind {
        Maintenance => "maintenance",
        Calibration => "calibration",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for condition in ItemCondition::ALL {
            assert_eq!(condition.as_str().parse::<ItemCondition>(), Ok(*condition));
        }
        assert!("under maintenance".parse::<ItemCondition>().is_err());
    }

    #[test]
    fn test_damage_severity_is_totally_ordered() {
        assert!(DamageSeverity::None < DamageSeverity::Minor);
        assert!(DamageSeverity::Minor < DamageSeverity::Moderate);
        assert!(DamageSeverity::Moderate < DamageSeverity::Severe);
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&ItemCondition::OutOfStock).unwrap();
        assert_eq!(json, "\"Out of Stock\"");
        let kind: BorrowerType = serde_json::from_str("\"guest\"").unwrap();
        assert_eq!(kind, BorrowerType::Guest);
    }

    #[test]
    fn test_disposable_categories() {
        assert!(Category::Consumable.is_disposable());
        assert!(Category::Liquid.is_disposable());
        assert!(!Category::Equipment.is_disposable());
    }
}
