// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Open enumerations for wire values.
//!
//! Unlike a Rust `enum`, an open enumeration can hold any value of its
//! storage type, so a device returning a code this crate does not name still
//! decodes. Named values print by name and unknown ones print as numbers.

macro_rules! open_enum {
    (
        $(#[$a:meta])*
        $v:vis enum $name:ident : $storage:ty {
            $(
                $(#[$vattr:meta])*
                $variant:ident = $value:expr,
            )*
        }
    ) => {
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[repr(transparent)]
        $(#[$a])*
        $v struct $name(pub $storage);

        impl $name {
            $(
                $(#[$vattr])*
                pub const $variant: $name = $name($value);
            )*

            /// Returns the name of the value, if it has one.
            #[allow(unreachable_patterns)]
            pub fn name(&self) -> Option<&'static str> {
                match *self {
                    $( Self::$variant => Some(stringify!($variant)), )*
                    _ => None,
                }
            }
        }

        impl From<$storage> for $name {
            fn from(value: $storage) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $storage {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, fmt: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                match self.name() {
                    Some(s) => fmt.pad(s),
                    None => write!(fmt, "{:#x}", self.0),
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, fmt: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Debug::fmt(self, fmt)
            }
        }
    };
}
