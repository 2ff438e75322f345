/// Generates a [`PropertySet`](crate::properties::PropertySet) struct.
///
/// Each field is declared as `"WireName" => field: Type`, optionally followed
/// by a policy list: `[ignore]`, `[ignore_when("Flag")]`, `[omit_empty]`,
/// `[emit]`.
///
/// # Example
/// ```
/// use bluez_props::bluez_properties;
///
/// bluez_properties! {
///     /// Battery level of a device.
///     pub struct Battery: "org.bluez.Battery1" {
///         /// Percentage of battery left.
///         "Percentage" => percentage: u8,
///     }
/// }
///
/// let battery = Battery { percentage: 42 };
/// assert_eq!(battery.percentage, 42);
/// ```
#[macro_export]
macro_rules! bluez_properties {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $interface:literal {
            $(
                $(#[$field_meta:meta])*
                $wire:literal => $field:ident : $ty:ty
                    $([ $( $policy:ident $( ( $arg:literal ) )? ),* $(,)? ])?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl $crate::properties::PropertySet for $name {
            const INTERFACE: &'static str = $interface;

            const FIELDS: &'static [$crate::properties::FieldSpec] = &[
                $(
                    $crate::properties::FieldSpec::new(
                        $wire,
                        <$ty as $crate::properties::PropertyValue>::KIND,
                    )
                    $( $( .$policy( $($arg)? ) )* )?,
                )*
            ];

            fn encode_field(
                &self,
                name: &str,
            ) -> $crate::Result<$crate::zbus::zvariant::OwnedValue> {
                match name {
                    $(
                        $wire => Ok($crate::properties::PropertyValue::to_value(&self.$field)?),
                    )*
                    _ => Err($crate::BluezError::PropertyNotFound(name.to_string())),
                }
            }

            fn decode_field(
                &mut self,
                name: &str,
                value: $crate::zbus::zvariant::OwnedValue,
            ) -> $crate::Result<()> {
                match name {
                    $(
                        $wire => {
                            self.$field = $crate::properties::decode::<$ty>($wire, value)?;
                            Ok(())
                        }
                    )*
                    _ => Err($crate::BluezError::PropertyNotFound(name.to_string())),
                }
            }

            fn is_empty_field(&self, name: &str) -> bool {
                match name {
                    $(
                        $wire => $crate::properties::PropertyValue::is_empty_value(&self.$field),
                    )*
                    _ => false,
                }
            }
        }
    };
}

/// Generates async getters that read properties from the remote object.
///
/// Used inside an `impl Binding<SomeProperties>` block.
#[macro_export]
macro_rules! remote_getters {
    ($( $(#[$meta:meta])* $method:ident => $wire:literal : $ty:ty ),* $(,)?) => {
        $(
            $(#[$meta])*
            ///
            /// # Errors
            ///
            /// Returns a transport, rejection or decode error from the remote read.
            pub async fn $method(&self) -> $crate::Result<$ty> {
                self.get_remote::<$ty>($wire).await
            }
        )*
    };
}
