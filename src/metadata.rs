//! Per-frame metadata attributes and the CSV sidecar writer.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::frame::Frame;

macro_rules! metadata_attributes {
    ($($variant:ident = $id:literal, $name:literal;)+) => {
        /// Metadata attribute a frame source may attach to a frame.
        ///
        /// Ordering follows the numeric attribute id.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MetadataAttribute {
            $($variant = $id,)+
        }

        impl MetadataAttribute {
            /// Every attribute, in ascending id order.
            pub const ALL: &'static [MetadataAttribute] = &[$(MetadataAttribute::$variant,)+];

            pub fn id(self) -> u32 {
                self as u32
            }

            pub fn from_id(id: u32) -> Option<Self> {
                match id {
                    $($id => Some(MetadataAttribute::$variant),)+
                    _ => None,
                }
            }

            /// Name written in the first column of the metadata file.
            pub fn name(self) -> &'static str {
                match self {
                    $(MetadataAttribute::$variant => $name,)+
                }
            }
        }
    };
}

metadata_attributes! {
    FrameCounter = 0, "Frame Counter";
    FrameTimestamp = 1, "Frame Timestamp";
    SensorTimestamp = 2, "Sensor Timestamp";
    ActualExposure = 3, "Actual Exposure";
    GainLevel = 4, "Gain Level";
    AutoExposure = 5, "Auto Exposure";
    WhiteBalance = 6, "White Balance";
    TimeOfArrival = 7, "Time Of Arrival";
    Temperature = 8, "Temperature";
    BackendTimestamp = 9, "Backend Timestamp";
    ActualFps = 10, "Actual Fps";
    FrameLaserPower = 11, "Frame Laser Power";
    FrameLaserPowerMode = 12, "Frame Laser Power Mode";
    ExposurePriority = 13, "Exposure Priority";
    ExposureRoiLeft = 14, "Exposure Roi Left";
    ExposureRoiRight = 15, "Exposure Roi Right";
    ExposureRoiTop = 16, "Exposure Roi Top";
    ExposureRoiBottom = 17, "Exposure Roi Bottom";
    Brightness = 18, "Brightness";
    Contrast = 19, "Contrast";
    Saturation = 20, "Saturation";
    Sharpness = 21, "Sharpness";
    AutoWhiteBalanceTemperature = 22, "Auto White Balance Temperature";
    BacklightCompensation = 23, "Backlight Compensation";
    Hue = 24, "Hue";
    Gamma = 25, "Gamma";
    ManualWhiteBalance = 26, "Manual White Balance";
    PowerLineFrequency = 27, "Power Line Frequency";
    LowLightCompensation = 28, "Low Light Compensation";
}

impl std::fmt::Display for MetadataAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Write every metadata attribute the frame reports to a two-column CSV file.
///
/// The file is truncated first. Attributes the frame does not report produce
/// no row.
pub fn write_metadata_csv(frame: &Frame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("create metadata file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_metadata(frame, &mut out)
        .and_then(|_| out.flush())
        .with_context(|| format!("write metadata file {}", path.display()))?;
    Ok(())
}

fn write_metadata<W: Write>(frame: &Frame, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "Stream,{}", frame.kind().label())?;
    writeln!(out, "Metadata Attribute,Value")?;
    for attribute in MetadataAttribute::ALL {
        if let Some(value) = frame.metadata_value(*attribute) {
            writeln!(out, "{},{}", attribute.name(), value)?;
        }
    }
    Ok(())
}
