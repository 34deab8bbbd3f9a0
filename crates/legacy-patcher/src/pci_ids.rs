//! PCI device ids per architecture.

pub const VENDOR_NVIDIA: u32 = 0x10DE;
pub const VENDOR_AMD: u32 = 0x1002;
pub const VENDOR_INTEL: u32 = 0x8086;
pub const VENDOR_BROADCOM: u32 = 0x14E4;
pub const VENDOR_ATHEROS: u32 = 0x168C;

pub const NVIDIA_TESLA: &[u32] = &[
    0x0190, 0x0191, 0x0193, 0x0194, 0x019E, 0x019D, 0x0400, 0x0401, 0x0402, 0x0403,
    0x0404, 0x0405, 0x0406, 0x0407, 0x0408, 0x0409, 0x040A, 0x040B, 0x040C, 0x040D,
    0x040E, 0x040F, 0x0420, 0x0421, 0x0422, 0x0423, 0x0424, 0x0425, 0x0426, 0x0427,
    0x0428, 0x0429, 0x042A, 0x042B, 0x042C, 0x042D, 0x042E, 0x042F, 0x0410, 0x0600,
    0x0601, 0x0602, 0x0603, 0x0604, 0x0605, 0x0606, 0x0607, 0x0608, 0x0609, 0x060A,
    0x060B, 0x060C, 0x060F, 0x0610, 0x0611, 0x0612, 0x0613, 0x0614, 0x0615, 0x0617,
    0x0618, 0x0619, 0x061A, 0x061B, 0x061C, 0x061D, 0x061E, 0x061F, 0x0621, 0x0622,
    0x0623, 0x0624, 0x0625, 0x0626, 0x0627, 0x0628, 0x062A, 0x062B, 0x062C, 0x062D,
    0x062E, 0x062F, 0x0631, 0x0635, 0x0637, 0x0638, 0x063A, 0x0640, 0x0641, 0x0643,
    0x0644, 0x0645, 0x0646, 0x0647, 0x0648, 0x0649, 0x064A, 0x064B, 0x064C, 0x0651,
    0x0652, 0x0653, 0x0654, 0x0655, 0x0656, 0x0658, 0x0659, 0x065A, 0x065B, 0x065C,
    0x065F, 0x06E0, 0x06E1, 0x06E2, 0x06E3, 0x06E4, 0x06E5, 0x06E6, 0x06E7, 0x06E8,
    0x06E9, 0x06EA, 0x06EB, 0x06EC, 0x06ED, 0x06EF, 0x06F1, 0x06F8, 0x06F9, 0x06FA,
    0x06FB, 0x06FD, 0x06FF, 0x05E0, 0x05E1, 0x05E2, 0x05E3, 0x05E6, 0x05E7, 0x05E9,
    0x05EA, 0x05EB, 0x05ED, 0x05EE, 0x05EF, 0x05FD, 0x05FE, 0x05FF, 0x0840, 0x0844,
    0x0845, 0x0846, 0x0847, 0x0848, 0x0849, 0x084A, 0x084B, 0x084C, 0x084D, 0x084F,
    0x0860, 0x0861, 0x0862, 0x0863, 0x0864, 0x0865, 0x0866, 0x0867, 0x0868, 0x0869,
    0x086A, 0x086C, 0x086D, 0x086E, 0x086F, 0x0870, 0x0871, 0x0872, 0x0873, 0x0874,
    0x0876, 0x087A, 0x087D, 0x087E, 0x087F, 0x0CA0, 0x0CA2, 0x0CA3, 0x0CA4, 0x0CA5,
    0x0CA7, 0x0CA9, 0x0CAC, 0x0CAF, 0x0CB0, 0x0CB1, 0x0CBC, 0x0A20, 0x0A22, 0x0A23,
    0x0A26, 0x0A27, 0x0A28, 0x0A29, 0x0A2A, 0x0A2B, 0x0A2C, 0x0A2D, 0x0A32, 0x0A34,
    0x0A35, 0x0A38, 0x0A3C, 0x0A60, 0x0A62, 0x0A63, 0x0A64, 0x0A65, 0x0A66, 0x0A67,
    0x0A68, 0x0A69, 0x0A6A, 0x0A6C, 0x0A6E, 0x0A6F, 0x0A70, 0x0A71, 0x0A72, 0x0A73,
    0x0A74, 0x0A75, 0x0A76, 0x0A78, 0x0A7A, 0x0A7C, 0x10C0, 0x10C3, 0x10C5, 0x10D8,
    0x08A0, 0x08A2, 0x08A3, 0x08A4,
];

pub const NVIDIA_FERMI: &[u32] = &[
    0x06C0, 0x06C4, 0x06CA, 0x06CB, 0x06CD, 0x06D1, 0x06D2, 0x06D8, 0x06D9, 0x06DA,
    0x06DC, 0x06DD, 0x06DE, 0x06DF, 0x0E22, 0x0E23, 0x0E24, 0x0E30, 0x0E31, 0x0E3A,
    0x0E3B, 0x1200, 0x1201, 0x1202, 0x1203, 0x1205, 0x1206, 0x1207, 0x1208, 0x1210,
    0x1211, 0x1212, 0x1213, 0x0DC0, 0x0DC4, 0x0DC5, 0x0DC6, 0x0DCD, 0x0DCE, 0x0DD1,
    0x0DD2, 0x0DD3, 0x0DD6, 0x0DD8, 0x0DDA, 0x1241, 0x1243, 0x1244, 0x1245, 0x1246,
    0x1247, 0x1248, 0x1249, 0x124B, 0x124D, 0x1251, 0x0DE0, 0x0DE1, 0x0DE2, 0x0DE3,
    0x0DE4, 0x0DE5, 0x0DE8, 0x0DE9, 0x0DEA, 0x0DEB, 0x0DEC, 0x0DED, 0x0DEE, 0x0DEF,
    0x0DF0, 0x0DF1, 0x0DF2, 0x0DF3, 0x0DF4, 0x0DF5, 0x0DF6, 0x0DF7, 0x0DF8, 0x0DF9,
    0x0DFA, 0x0DFC, 0x0F00, 0x0F01, 0x0F02, 0x1080, 0x1081, 0x1082, 0x1084, 0x1086,
    0x1087, 0x1088, 0x1089, 0x108B, 0x1091, 0x1096, 0x109A, 0x109B, 0x1040, 0x1042,
    0x1048, 0x1049, 0x104A, 0x104B, 0x104C, 0x1050, 0x1051, 0x1052, 0x1054, 0x1055,
    0x1056, 0x1057, 0x1058, 0x1059, 0x105A, 0x105B, 0x107C, 0x107D, 0x1140,
];

pub const NVIDIA_KEPLER: &[u32] = &[
    0x1180, 0x1182, 0x1183, 0x1184, 0x1185, 0x1186, 0x1187, 0x1188, 0x1189, 0x118A,
    0x118B, 0x118C, 0x118D, 0x118E, 0x118F, 0x1191, 0x1193, 0x1194, 0x1195, 0x1198,
    0x1199, 0x119A, 0x119D, 0x119E, 0x119F, 0x11A0, 0x11A1, 0x11A2, 0x11A3, 0x11A7,
    0x11A8, 0x11A9, 0x11AF, 0x11B0, 0x11B1, 0x11B4, 0x11B6, 0x11B7, 0x11B8, 0x11B9,
    0x11BA, 0x11BC, 0x11BD, 0x11BE, 0x11BF, 0x11C0, 0x11C2, 0x11C3, 0x11C4, 0x11C5,
    0x11C6, 0x11C7, 0x11C8, 0x11E0, 0x11CB, 0x11E1, 0x11E2, 0x11E3, 0x11E7, 0x11FA,
    0x11FC, 0x0FC0, 0x0FC1, 0x0FC2, 0x0FC5, 0x0FC6, 0x0FC8, 0x0FC9, 0x0FCD, 0x0FCE,
    0x0FD1, 0x0FD2, 0x0FD3, 0x0FD4, 0x0FD5, 0x0FD6, 0x0FD8, 0x0FD9, 0x0FDB, 0x0FDF,
    0x0FE0, 0x0FE1, 0x0FE2, 0x0FE3, 0x0FE4, 0x0FE5, 0x0FE6, 0x0FE7, 0x0FE8, 0x0FE9,
    0x0FEA, 0x0FEC, 0x0FEE, 0x0FED, 0x0FEF, 0x0FF1, 0x0FF2, 0x0FF3, 0x0FF5, 0x0FF6,
    0x0FF7, 0x0FF8, 0x0FF9, 0x0FFA, 0x0FFB, 0x0FFC, 0x0FFD, 0x0FFE, 0x0FFF, 0x1001,
    0x1003, 0x1004, 0x1005, 0x1007, 0x1008, 0x100A, 0x100C, 0x101E, 0x101F, 0x1020,
    0x1021, 0x1022, 0x1023, 0x1026, 0x1027, 0x1028, 0x1029, 0x102A, 0x102E, 0x102F,
    0x103A, 0x103C, 0x103F, 0x1024, 0x1280, 0x1281, 0x1282, 0x1284, 0x1286, 0x1287,
    0x1288, 0x1289, 0x128A, 0x128B, 0x128C, 0x1290, 0x1291, 0x1292, 0x1293, 0x1294,
    0x1295, 0x1296, 0x1298, 0x1299, 0x129A, 0x12A0, 0x12B9, 0x12BA, 0x102D,
];

pub const NVIDIA_MAXWELL: &[u32] = &[
    0x1340, 0x1341, 0x1344, 0x1346, 0x1347, 0x1348, 0x1349, 0x134B, 0x134D, 0x134E,
    0x134F, 0x137A, 0x137B, 0x137D, 0x174D, 0x174E, 0x1380, 0x1381, 0x1382, 0x1389,
    0x1390, 0x1391, 0x1392, 0x1393, 0x1398, 0x1399, 0x139A, 0x139B, 0x139C, 0x139D,
    0x13B0, 0x13B1, 0x13B2, 0x13B3, 0x13B4, 0x13B6, 0x13B9, 0x13BA, 0x13BB, 0x13BC,
    0x13BD, 0x1789, 0x179C, 0x17C2, 0x17C8, 0x17F0, 0x17F1, 0x17FD, 0x13C0, 0x13C1,
    0x13C2, 0x13C3, 0x13D7, 0x13D8, 0x13D9, 0x13DA, 0x13E7, 0x13F0, 0x13F1, 0x13F2,
    0x13F3, 0x13F8, 0x13F9, 0x13FA, 0x13FB, 0x1401, 0x1402, 0x1404, 0x1406, 0x1407,
    0x1427, 0x1430, 0x1431, 0x1436,
];

pub const NVIDIA_PASCAL: &[u32] = &[
    0x1725, 0x172E, 0x172F, 0x15F0, 0x15F1, 0x15F7, 0x15F8, 0x15F9, 0x1B00, 0x1B01,
    0x1B02, 0x1B04, 0x1B06, 0x1B07, 0x1B30, 0x1B38, 0x1B39, 0x1B70, 0x1B78, 0x1B80,
    0x1B81, 0x1B82, 0x1B83, 0x1B84, 0x1B87, 0x1BA0, 0x1BA1, 0x1BA2, 0x1BA9, 0x1BAA,
    0x1BAD, 0x1BB0, 0x1BB1, 0x1BB3, 0x1BB4, 0x1BB5, 0x1BB6, 0x1BB7, 0x1BB8, 0x1BB9,
    0x1BBB, 0x1BC7, 0x1BE0, 0x1BE1, 0x1C00, 0x1C01, 0x1C02, 0x1C03, 0x1C04, 0x1C06,
    0x1C07, 0x1C09, 0x1C20, 0x1C21, 0x1C22, 0x1C23, 0x1C2D, 0x1C30, 0x1C31, 0x1C35,
    0x1C36, 0x1C60, 0x1C61, 0x1C62, 0x1C70, 0x1C80, 0x1C81, 0x1C82, 0x1C83, 0x1C8C,
    0x1C8D, 0x1C8E, 0x1C8F, 0x1C90, 0x1C91, 0x1C92, 0x1C94, 0x1C96, 0x1CA7, 0x1CA8,
    0x1CAA, 0x1CB1, 0x1CB2, 0x1CB3, 0x1CB6, 0x1CBA, 0x1CBB, 0x1CBC, 0x1CBD, 0x1CCC,
    0x1CCD, 0x1CFA, 0x1CFB, 0x1D01, 0x1D02, 0x1D10, 0x1D11, 0x1D12, 0x1D13, 0x1D16,
    0x1D33, 0x1D34, 0x1D52, 0x1D56,
];

pub const AMD_TERASCALE_1: &[u32] = &[
    0x9400, 0x9401, 0x9402, 0x9403, 0x9581, 0x9583, 0x9588, 0x94C8, 0x94C9, 0x9500,
    0x9501, 0x9505, 0x9507, 0x9504, 0x9506, 0x9598, 0x9488, 0x9599, 0x9591, 0x9593,
    0x9440, 0x9442, 0x944A, 0x945A, 0x9490, 0x949E, 0x9480, 0x9540, 0x9541, 0x954E,
    0x954F, 0x9552, 0x9553, 0x94A0,
];

pub const AMD_TERASCALE_2: &[u32] = &[
    0x6738, 0x6739, 0x6720, 0x6722, 0x6768, 0x6770, 0x6779, 0x6760, 0x6761, 0x68E0,
    0x6898, 0x6899, 0x68B8, 0x68B0, 0x68B1, 0x68A0, 0x68A1, 0x6840, 0x6841, 0x68D8,
    0x68C0, 0x68C1, 0x68D9, 0x6750, 0x6758, 0x6759, 0x6740, 0x6741, 0x6745,
];

pub const AMD_LEGACY_GCN: &[u32] = &[
    0x6800, 0x6801, 0x6806, 0x6808, 0x6810, 0x6818, 0x6819, 0x6790, 0x6798, 0x679A,
    0x679E, 0x6780, 0x6820, 0x6821, 0x6823, 0x6825, 0x6827, 0x682B, 0x682D, 0x682F,
    0x6835, 0x6839, 0x683B, 0x683D, 0x683F, 0x6640, 0x6641, 0x6646, 0x6647, 0x6650,
    0x6651, 0x665C, 0x665D, 0x67B0, 0x7300, 0x730F, 0x6920, 0x6921, 0x6930, 0x6938,
    0x6939,
];

pub const AMD_POLARIS: &[u32] = &[
    0x67E0, 0x67E3, 0x67E8, 0x67EB, 0x67EF, 0x67FF, 0x67E1, 0x67E7, 0x67E9, 0x67C0,
    0x67C1, 0x67C2, 0x67C4, 0x67C7, 0x67DF, 0x67D0, 0x67C8, 0x67C9, 0x67CA, 0x67CC,
    0x67CF,
];

pub const AMD_VEGA: &[u32] = &[
    0x6860, 0x6861, 0x6862, 0x6863, 0x6864, 0x6867, 0x6868, 0x6869, 0x686A, 0x686B,
    0x686C, 0x686D, 0x686E, 0x686F, 0x687F, 0x69A0, 0x69A1, 0x69A2, 0x69A3, 0x69AF,
    0x66A0, 0x66A1, 0x66A2, 0x66A3, 0x66A7, 0x66AF,
];

pub const INTEL_IRON_LAKE: &[u32] = &[
    0x0044, 0x0046,
];

pub const INTEL_SANDY_BRIDGE: &[u32] = &[
    0x0106, 0x0601, 0x0116, 0x0102, 0x0126,
];

pub const INTEL_IVY_BRIDGE: &[u32] = &[
    0x0152, 0x0156, 0x0162, 0x0166,
];

pub const INTEL_HASWELL: &[u32] = &[
    0x0D26, 0x0A26, 0x0A2E, 0x0D22, 0x0412,
];

pub const INTEL_BROADWELL: &[u32] = &[
    0x0BD1, 0x0BD2, 0x0BD3, 0x1606, 0x160E, 0x1616, 0x161E, 0x1626, 0x1622, 0x1612,
    0x162B,
];

pub const INTEL_SKYLAKE: &[u32] = &[
    0x1916, 0x191E, 0x1926, 0x1927, 0x1912, 0x1932, 0x1902, 0x1917, 0x193B, 0x191B,
];

pub const BROADCOM_BCM4331: &[u32] = &[
    0x432B,
];

pub const BROADCOM_BCM43224: &[u32] = &[
    0x4311, 0x4312, 0x4313, 0x4318, 0x4319, 0x431A, 0x4320, 0x4324, 0x4325, 0x4328,
    0x432C, 0x432D,
];

/// AirPortBrcmNIC class, plus the cards only AirportBrcmFixup drives.
pub const BROADCOM_BRCM_NIC: &[u32] = &[
    0x43BA, 0x43A3, 0x43A0, 0x4357, 0x43B1, 0x43B2,
];

pub const BROADCOM_BCM4360: &[u32] = &[
    0x4331, 0x4353,
];

pub const ATHEROS_AR9XXX: &[u32] = &[
    0x0030, 0x002A, 0x001C, 0x0023, 0x0024,
];
