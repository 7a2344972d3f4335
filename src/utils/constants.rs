/// Missing-value sentinel used by GHCN-Daily for DATA_VALUE
pub const MISSING_VALUE: i32 = -9999;

/// Missing elevation in ghcnd-stations.txt
pub const MISSING_ELEVATION: f64 = -999.9;

/// Default element extracted from station files
pub const DEFAULT_ELEMENT: &str = "PRCP";

/// Station id prefix of the CoCoRaHS volunteer network
pub const COCORAHS_PREFIX: &str = "US1";

/// File names
pub const GHCND_STATIONS_FILE: &str = "ghcnd-stations.txt";
pub const STATION_FILE_EXTENSION: &str = "csv";

/// GHCN-Daily station ids are 11 characters: 2 country + 1 network + 8 site
pub const STATION_ID_LEN: usize = 11;

/// Fixed-width column ranges of ghcnd-stations.txt (0-based, end exclusive)
pub const FW_ID: (usize, usize) = (0, 11);
pub const FW_LATITUDE: (usize, usize) = (12, 20);
pub const FW_LONGITUDE: (usize, usize) = (21, 30);
pub const FW_ELEVATION: (usize, usize) = (31, 37);
pub const FW_NAME: (usize, usize) = (41, 71);

/// Core and commonly distributed GHCN-Daily element codes
pub const KNOWN_ELEMENTS: &[&str] = &[
    "PRCP", "SNOW", "SNWD", "TMAX", "TMIN", "TAVG", "TOBS", "MDPR", "DAPR", "DASF", "MDSF",
    "WESD", "WESF", "AWND", "EVAP", "MNPN", "MXPN", "PGTM", "PSUN", "TSUN", "WDF2", "WDF5",
    "WSF2", "WSF5", "WDFG", "WSFG", "THIC", "FRGT", "FRGB", "GAHT", "ACMC", "ACMH", "ACSC",
    "ACSH",
];

/// Element families with numbered members (SN*#, SX*#, WT**, WV**)
pub const ELEMENT_FAMILIES: &[&str] = &["SN", "SX", "WT", "WV"];

/// Output column order, a stable contract for downstream tools
pub const OUTPUT_COLUMNS: [&str; 9] = [
    "station_id",
    "date",
    "latitude",
    "longitude",
    "name",
    "value",
    "mflag",
    "qflag",
    "sflag",
];

/// Processing defaults
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;
pub const DEFAULT_BUFFER_SIZE: usize = 8192 * 16; // 128KB

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "GHCN";
