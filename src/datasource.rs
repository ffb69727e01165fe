//! Connection string templates of supported data sources.
use structopt::StructOpt;

use crate::query::Options;

/// Data source to connect to
#[derive(Debug, Clone, PartialEq, StructOpt)]
pub enum DataSource {
    /// Visual FoxPro database container (.dbc file) or directory of free tables
    #[structopt(name = "vfp")]
    Vfp {
        #[structopt(name = "DATABASE")]
        database: String,
    },

    /// SoftVelocity TopSpeed directory of .tps files
    #[structopt(name = "topspeed")]
    Topspeed {
        #[structopt(name = "DIRECTORY")]
        directory: String,
    },

    /// Microsoft SQL Server; Windows authentication is used unless --user is given
    #[structopt(name = "mssql")]
    Mssql {
        /// Server address or name
        #[structopt(long, value_name = "SRV", default_value = "localhost")]
        server: String,

        /// Initial database; server settings apply when not given
        #[structopt(long, value_name = "DB")]
        database: Option<String>,

        /// User name for SQL Server authentication
        #[structopt(long)]
        user: Option<String>,

        #[structopt(long, value_name = "PASS", default_value = "")]
        password: String,
    },

    /// Any ODBC data source given by connection string
    #[structopt(name = "odbc")]
    Odbc {
        #[structopt(name = "CONNECTION_STRING")]
        connection_string: String,
    },
}

/// Quote connection string attribute value if needed.
fn attribute_value(value: &str) -> String {
    if value.contains(|c: char| c == ';' || c == '{' || c == '}') || value.trim() != value {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_owned()
    }
}

impl DataSource {
    pub fn connection_string(&self) -> String {
        match self {
            DataSource::Vfp { database } => {
                let source_type = if database.to_lowercase().ends_with(".dbc") {
                    "DBC"
                } else {
                    "DBF"
                };
                format!(
                    "Driver={{Microsoft Visual FoxPro Driver}};SourceType={};SourceDB={};\
                     Exclusive=No;Collate=Machine;NULL=No;DELETED=Yes;BackgroundFetch=No",
                    source_type,
                    attribute_value(database)
                )
            }
            DataSource::Topspeed { directory } => format!(
                "Driver={{SoftVelocity Topspeed driver (*.tps)}};Dbq={};Extension=tps;Oem=N;NullEmptyStr=N",
                attribute_value(directory)
            ),
            DataSource::Mssql {
                server,
                database,
                user,
                password,
            } => {
                let mut connection_string = format!(
                    "Driver={{SQL Server Native Client 11.0}};Server={};",
                    attribute_value(server)
                );
                if let Some(database) = database {
                    connection_string.push_str(&format!("Database={};", attribute_value(database)));
                }
                match user {
                    Some(user) => connection_string.push_str(&format!(
                        "Uid={};Pwd={}",
                        attribute_value(user),
                        attribute_value(password)
                    )),
                    None => connection_string.push_str("Trusted_Connection=yes"),
                }
                connection_string
            }
            DataSource::Odbc { connection_string } => connection_string.clone(),
        }
    }

    /// Data access options suitable for the driver.
    pub fn options(&self) -> Options {
        match self {
            DataSource::Vfp { .. } => Options {
                integer_parameters_as_float: true,
                ..Options::default()
            },
            _ => Options::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vfp() {
        let source = DataSource::Vfp {
            database: r"C:\data\Shop.DBC".to_owned(),
        };
        assert_eq!(
            source.connection_string(),
            "Driver={Microsoft Visual FoxPro Driver};SourceType=DBC;SourceDB=C:\\data\\Shop.DBC;\
             Exclusive=No;Collate=Machine;NULL=No;DELETED=Yes;BackgroundFetch=No"
        );
        assert!(source.options().integer_parameters_as_float);

        let source = DataSource::Vfp {
            database: r"C:\data".to_owned(),
        };
        assert!(source.connection_string().contains("SourceType=DBF;SourceDB=C:\\data;"));
    }

    #[test]
    fn test_topspeed() {
        let source = DataSource::Topspeed {
            directory: "/srv/tps".to_owned(),
        };
        assert_eq!(
            source.connection_string(),
            "Driver={SoftVelocity Topspeed driver (*.tps)};Dbq=/srv/tps;Extension=tps;Oem=N;NullEmptyStr=N"
        );
        assert!(!source.options().integer_parameters_as_float);
    }

    #[test]
    fn test_mssql_windows_auth() {
        let source = DataSource::Mssql {
            server: "localhost".to_owned(),
            database: None,
            user: None,
            password: String::new(),
        };
        assert_eq!(
            source.connection_string(),
            "Driver={SQL Server Native Client 11.0};Server=localhost;Trusted_Connection=yes"
        );
    }

    #[test]
    fn test_mssql_server_auth() {
        let source = DataSource::Mssql {
            server: "db1".to_owned(),
            database: Some("shop".to_owned()),
            user: Some("sa".to_owned()),
            password: "p;w}d".to_owned(),
        };
        assert_eq!(
            source.connection_string(),
            "Driver={SQL Server Native Client 11.0};Server=db1;Database=shop;Uid=sa;Pwd={p;w}}d}"
        );
    }

    #[test]
    fn test_odbc() {
        let source = DataSource::Odbc {
            connection_string: "DSN=test".to_owned(),
        };
        assert_eq!(source.connection_string(), "DSN=test");
    }

    #[test]
    fn test_command_line() {
        let source = DataSource::from_iter(&["basq", "mssql", "--server", "db1", "--user", "sa"]);
        assert_eq!(
            source,
            DataSource::Mssql {
                server: "db1".to_owned(),
                database: None,
                user: Some("sa".to_owned()),
                password: String::new(),
            }
        );

        let source = DataSource::from_iter(&["basq", "vfp", "db.dbc"]);
        assert_eq!(
            source,
            DataSource::Vfp {
                database: "db.dbc".to_owned()
            }
        );
    }
}
