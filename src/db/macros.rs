//! Declarative macros.
//!
//! `impl_db_dispatch!` generates the per-backend match over [`DbPool`]
//! variants; `params!` builds a [`Params`] set inline.
//!
//! [`DbPool`]: crate::db::pool::DbPool
//! [`Params`]: crate::models::Params

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `DbPool` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Build named parameters for a `:name` template.
///
/// ```ignore
/// let params = params! { "name" => "Deadpond", "age" => 30 };
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::models::Params::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::models::Params::new();
        $(
            params.insert($name, $value);
        )+
        params
    }};
}

pub use impl_db_dispatch;
