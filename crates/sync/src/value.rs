use crate::error::SyncError;
use glam::{Quat, Vec3};
use worldsync_common::NetPointer;
use worldsync_persist::{LeafType, LeafValue};

/// A value that a [`crate::Synced`] field can hold and put on the wire.
pub trait SyncValue: Clone + Default + Send + 'static {
    fn to_leaf(&self) -> LeafValue;
    fn from_leaf(leaf: &LeafValue) -> Result<Self, SyncError>;
}

macro_rules! leaf_sync_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SyncValue for $ty {
                fn to_leaf(&self) -> LeafValue {
                    self.clone().into_leaf()
                }

                fn from_leaf(leaf: &LeafValue) -> Result<Self, SyncError> {
                    <$ty as LeafType>::from_leaf(leaf).ok_or(SyncError::ValueType {
                        type_name: stringify!($ty),
                        actual: leaf.kind(),
                    })
                }
            }
        )+
    };
}

leaf_sync_value!(
    bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, char, String, Vec<u8>, NetPointer,
    Vec3, Quat,
);

/// Fieldless enums that travel as their `i32` ordinal.
///
/// The ordinal, not the variant name, is what reaches the wire and disk. Once
/// an enum has shipped, its ordinals must never be renumbered; add new
/// variants with new ordinals only.
pub trait SyncEnum: Copy {
    fn ordinal(self) -> i32;
    fn from_ordinal(ordinal: i32) -> Option<Self>;
}

/// Implement [`SyncEnum`] and [`SyncValue`] for a fieldless enum.
///
/// ```ignore
/// #[derive(Clone, Copy, Default)]
/// enum Mode { #[default] Idle, Busy }
/// impl_sync_enum!(Mode { Idle, Busy });
/// ```
#[macro_export]
macro_rules! impl_sync_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::SyncEnum for $ty {
            fn ordinal(self) -> i32 {
                self as i32
            }

            fn from_ordinal(ordinal: i32) -> Option<Self> {
                $(
                    if ordinal == $ty::$variant as i32 {
                        return Some($ty::$variant);
                    }
                )+
                None
            }
        }

        impl $crate::SyncValue for $ty {
            fn to_leaf(&self) -> $crate::LeafValue {
                $crate::LeafValue::I32(<$ty as $crate::SyncEnum>::ordinal(*self))
            }

            fn from_leaf(leaf: &$crate::LeafValue) -> Result<Self, $crate::SyncError> {
                let ordinal = <i32 as $crate::SyncValue>::from_leaf(leaf)?;
                <$ty as $crate::SyncEnum>::from_ordinal(ordinal).ok_or(
                    $crate::SyncError::UnknownOrdinal {
                        type_name: stringify!($ty),
                        ordinal,
                    },
                )
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    enum Shade {
        #[default]
        Light,
        Dark = 7,
    }

    impl_sync_enum!(Shade { Light, Dark });

    #[test]
    fn enum_stores_ordinal() {
        assert_eq!(Shade::Dark.to_leaf(), LeafValue::I32(7));
        assert_eq!(Shade::from_leaf(&LeafValue::I32(0)).unwrap(), Shade::Light);
    }

    #[test]
    fn unknown_ordinal_rejected() {
        let err = Shade::from_leaf(&LeafValue::I32(3)).unwrap_err();
        assert!(matches!(err, SyncError::UnknownOrdinal { ordinal: 3, .. }));
    }

    #[test]
    fn primitive_type_mismatch() {
        let err = <String as SyncValue>::from_leaf(&LeafValue::Bool(true)).unwrap_err();
        assert!(matches!(
            err,
            SyncError::ValueType {
                actual: "bool",
                ..
            }
        ));
    }

    #[test]
    fn glam_values_roundtrip() {
        let v = Vec3::new(1.0, -2.0, 3.5);
        assert_eq!(<Vec3 as SyncValue>::from_leaf(&v.to_leaf()).unwrap(), v);
    }
}
