/// Discrete requests from the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleRecording,
    StartRecording,
    StopRecording,
    IncreaseBrightness,
    DecreaseBrightness,
    IncreaseContrast,
    DecreaseContrast,
    ToggleFlip,
    ToggleGrayscale,
    ToggleTimestamp,
    Quit,
}
