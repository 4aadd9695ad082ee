// Keys are lowercase, lookups go through SymbolTable::key.

pub(super) static ENVIRONMENT: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "allusersprofile" => r"C:\ProgramData",
    "appdata" => r"C:\Users\user\AppData\Roaming",
    "commonprogramfiles" => r"C:\Program Files\Common Files",
    "commonprogramfiles(x86)" => r"C:\Program Files (x86)\Common Files",
    "comspec" => r"C:\Windows\system32\cmd.exe",
    "homedrive" => "C:",
    "homepath" => r"\Users\user",
    "localappdata" => r"C:\Users\user\AppData\Local",
    "os" => "Windows_NT",
    "path" => r"C:\Windows\system32;C:\Windows;C:\Windows\System32\Wbem;C:\Windows\System32\WindowsPowerShell\v1.0\",
    "pathext" => ".COM;.EXE;.BAT;.CMD;.VBS;.VBE;.JS;.JSE;.WSF;.WSH;.MSC",
    "processor_architecture" => "AMD64",
    "programdata" => r"C:\ProgramData",
    "programfiles" => r"C:\Program Files",
    "programfiles(x86)" => r"C:\Program Files (x86)",
    "public" => r"C:\Users\Public",
    "systemdrive" => "C:",
    "systemroot" => r"C:\Windows",
    "temp" => r"C:\Users\user\AppData\Local\Temp",
    "tmp" => r"C:\Users\user\AppData\Local\Temp",
    "userprofile" => r"C:\Users\user",
    "windir" => r"C:\Windows",
};

pub(super) static INF_DIRIDS: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "10" => r"C:\Windows",
    "11" => r"C:\Windows\System32",
    "12" => r"C:\Windows\System32\drivers",
    "17" => r"C:\Windows\INF",
    "18" => r"C:\Windows\Help",
    "20" => r"C:\Windows\Fonts",
    "24" => r"C:\",
    "25" => r"C:\Windows",
    "30" => r"C:\",
    "53" => r"C:\Users\user",
    "16422" => r"C:\Program Files",
    "16427" => r"C:\Program Files\Common Files",
};
