// USB identification
pub const STLINK_VENDOR_ID: u16 = 0x0483;
pub const STLINK_PRODUCT_IDS: [u16; 7] = [
    0x3748, // V2
    0x374B, // V2-1
    0x3752, // V2-1 without mass storage
    0x374E, // V3E
    0x374F, // V3
    0x3753, // V3 without mass storage
    0x3754, // V3 without mass storage, alternate
];

// Bulk endpoints used in DFU mode
pub const EP_OUT: u8 = 0x01;
pub const EP_IN: u8 = 0x81;

pub const USB_TIMEOUT_MS: u64 = 5000;

/// Every command sent on the OUT pipe is padded to this size.
pub const COMMAND_SIZE: usize = 16;

// Command opcodes
pub const CMD_GET_VERSION: [u8; 2] = [0xF1, 0x80];
pub const CMD_GET_VERSION_EXT: [u8; 2] = [0xFB, 0x80];
pub const CMD_READ_UNIQUE_ID: [u8; 2] = [0xF3, 0x08];
pub const CMD_GET_CURRENT_MODE: u8 = 0xF5;
pub const CMD_DFU: u8 = 0xF3;

// Reply sizes
pub const GET_VERSION_REPLY_SIZE: usize = 6;
pub const GET_VERSION_EXT_REPLY_SIZE: usize = 12;
pub const READ_UNIQUE_ID_REPLY_SIZE: usize = 20;
pub const GET_CURRENT_MODE_REPLY_SIZE: usize = 2;
pub const DFU_STATUS_REPLY_SIZE: usize = 6;

// DFU sub-opcodes
pub const DFU_DETACH: u8 = 0x00;
pub const DFU_DNLOAD: u8 = 0x01;
pub const DFU_UPLOAD: u8 = 0x02;
pub const DFU_GETSTATUS: u8 = 0x03;
pub const DFU_CLRSTATUS: u8 = 0x04;
pub const DFU_GETSTATE: u8 = 0x05;
pub const DFU_ABORT: u8 = 0x06;
pub const DFU_EXIT: u8 = 0x07;

// Vendor commands carried in block 0 downloads
pub const SET_ADDRESS_POINTER_COMMAND: u8 = 0x21;
pub const ERASE_PAGES_COMMAND: u8 = 0x41;
pub const ERASE_SECTORS_COMMAND: u8 = 0x42;

/// Size of a block 0 vendor command (opcode + 32-bit argument).
pub const VENDOR_COMMAND_SIZE: usize = 5;

/// Block numbers at or above this value carry encrypted firmware.
pub const FIRST_DATA_BLOCK: u16 = 2;

// Cipher keys
pub const KEY_LEGACY: &[u8; 16] = b"I am key, wawawa";
pub const KEY_V3: &[u8; 16] = b" found...STlink ";
pub const KEY_V3_PAYLOAD: &[u8; 16] = b" .ST-Link.ver.3.";

// Flash layout
pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FLASH_SECTOR_COUNT: u32 = 32;
pub const SECTOR_SIZE_LARGE: u32 = 0x8000;
pub const SECTOR_SIZE_DEFAULT: u32 = 0x4000;
/// Target whose flash uses the doubled sector size.
pub const PRODUCT_ID_LARGE_SECTORS: u16 = 0x449;

// Where the probe application lives, above the bootloader
pub const APPLICATION_BASE_LEGACY: u32 = 0x0800_4000;
pub const APPLICATION_BASE_V3: u32 = 0x0802_0000;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;
